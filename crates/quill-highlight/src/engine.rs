//! Single-line tokenizer.
//!
//! The engine scans one line at a time. The only state carried from one line
//! to the next is the [`SpanStack`] of spans still open at the line end.

use std::sync::Arc;

use quill_core::{DocumentLine, ImmutableStack};
use regex::Regex;

use crate::color::HighlightingColor;
use crate::definition::{HighlightingDefinition, HighlightingRuleSet, SpanId};
use crate::error::{DefinitionError, HighlightingError};
use crate::highlighted_line::{HighlightedLine, HighlightedSection};

/// Spans open at a line boundary, innermost on top.
pub type SpanStack = ImmutableStack<SpanId>;

/// Highlights lines against one definition.
#[derive(Debug, Clone)]
pub struct HighlightingEngine {
    definition: Arc<HighlightingDefinition>,
    span_stack: SpanStack,
}

impl HighlightingEngine {
    /// An engine starting outside any span.
    pub fn new(definition: Arc<HighlightingDefinition>) -> Self {
        Self {
            definition,
            span_stack: SpanStack::new(),
        }
    }

    /// The definition in use.
    pub fn definition(&self) -> &Arc<HighlightingDefinition> {
        &self.definition
    }

    /// Spans open at the end of the last scanned line.
    pub fn current_span_stack(&self) -> &SpanStack {
        &self.span_stack
    }

    /// Sets the spans open at the start of the next line.
    pub fn set_current_span_stack(&mut self, stack: SpanStack) {
        self.span_stack = stack;
    }

    /// Highlights `line`, whose text is `text`, and advances the span stack.
    ///
    /// On error the span stack is left unchanged.
    pub fn highlight_line(&mut self, line: &DocumentLine, text: &str) -> Result<HighlightedLine, HighlightingError> {
        debug_assert_eq!(text.chars().count(), line.length);
        let mut scanner = LineScanner::new(
            &self.definition,
            text,
            self.span_stack.clone(),
            Some(SectionBuilder::new(text, line.offset)),
        );
        scanner.run()?;
        let sections = scanner.output.map(SectionBuilder::finish).unwrap_or_default();
        self.span_stack = scanner.stack;
        Ok(HighlightedLine::with_sections(line, sections))
    }

    /// Advances the span stack over `text` without producing sections.
    ///
    /// Flat rules are not evaluated.
    pub fn scan_line(&mut self, text: &str) -> Result<(), HighlightingError> {
        let mut scanner = LineScanner::new(&self.definition, text, self.span_stack.clone(), None);
        scanner.run()?;
        self.span_stack = scanner.stack;
        Ok(())
    }
}

/// Memoized result of searching for one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Unknown,
    Miss,
    Hit(usize, usize),
}

impl Probe {
    /// Re-searches unless the cached hit is still at or after `position`.
    ///
    /// A miss stays a miss: nothing matches past a failed search.
    fn refresh(&mut self, regex: &Regex, haystack: &str, position: usize) {
        let stale = match *self {
            Probe::Unknown => true,
            Probe::Miss => false,
            Probe::Hit(start, _) => start < position,
        };
        if stale {
            *self = search(regex, haystack, position);
        }
    }
}

fn search(regex: &Regex, haystack: &str, position: usize) -> Probe {
    match regex.find_at(haystack, position) {
        Some(m) => Probe::Hit(m.start(), m.end()),
        None => Probe::Miss,
    }
}

/// Earliest hit; on equal starts the lowest index wins.
fn earliest(probes: &[Probe]) -> Option<(usize, usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    for (index, probe) in probes.iter().enumerate() {
        if let Probe::Hit(start, end) = *probe
            && best.is_none_or(|(best_start, _, _)| start < best_start)
        {
            best = Some((start, end, index));
        }
    }
    best
}

struct LineScanner<'a> {
    definition: &'a HighlightingDefinition,
    text: &'a str,
    /// Byte position in `text`.
    position: usize,
    stack: SpanStack,
    output: Option<SectionBuilder>,
}

impl<'a> LineScanner<'a> {
    fn new(
        definition: &'a HighlightingDefinition,
        text: &'a str,
        stack: SpanStack,
        output: Option<SectionBuilder>,
    ) -> Self {
        Self {
            definition,
            text,
            position: 0,
            stack,
            output,
        }
    }

    fn run(&mut self) -> Result<(), DefinitionError> {
        let definition = self.definition;

        let open: Vec<SpanId> = self.stack.iter().copied().collect();
        for &span in open.iter().rev() {
            self.push_color(definition.span(span).span_color.as_ref());
        }

        let mut rule_set = definition.rule_set_for(&self.stack);
        let mut stored: Vec<Vec<Probe>> = Vec::new();
        let mut probes = vec![Probe::Unknown; rule_set.spans.len()];

        loop {
            for (probe, &span) in probes.iter_mut().zip(&rule_set.spans) {
                probe.refresh(&definition.span(span).start, self.text, self.position);
            }
            let end_match = self
                .stack
                .peek()
                .and_then(|&span| match search(&definition.span(span).end, self.text, self.position) {
                    Probe::Hit(start, end) => Some((start, end, span)),
                    _ => None,
                });
            let start_match = earliest(&probes);

            // A span start beats the active span's end at the same offset.
            let closes = match (end_match, start_match) {
                (Some((end_start, _, _)), Some((start, _, _))) => end_start < start,
                (Some(_), None) => true,
                (None, _) => false,
            };

            if closes {
                let Some((start, end, span_id)) = end_match else {
                    break;
                };
                let span = definition.span(span_id);
                self.highlight_non_spans(rule_set, start)?;
                if !span.span_color_includes_end {
                    self.pop_color();
                }
                self.push_color(span.end_color.as_ref());
                self.position = end;
                self.pop_color();
                if span.span_color_includes_end {
                    self.pop_color();
                }
                self.stack = self.stack.pop().unwrap_or_default();
                rule_set = definition.rule_set_for(&self.stack);
                probes = stored
                    .pop()
                    .unwrap_or_else(|| vec![Probe::Unknown; rule_set.spans.len()]);
            } else if let Some((start, end, index)) = start_match {
                let span_id = rule_set.spans[index];
                let span = definition.span(span_id);
                if start == end {
                    return Err(DefinitionError::ZeroWidthSpan {
                        start: span.start_pattern().to_string(),
                        end: span.end_pattern().to_string(),
                    });
                }
                self.highlight_non_spans(rule_set, start)?;
                self.stack = self.stack.push(span_id);
                rule_set = definition.rule_set_for(&self.stack);
                stored.push(std::mem::replace(
                    &mut probes,
                    vec![Probe::Unknown; rule_set.spans.len()],
                ));
                if span.span_color_includes_start {
                    self.push_color(span.span_color.as_ref());
                }
                self.push_color(span.start_color.as_ref());
                self.position = end;
                self.pop_color();
                if !span.span_color_includes_start {
                    self.push_color(span.span_color.as_ref());
                }
            } else {
                break;
            }
        }

        self.highlight_non_spans(rule_set, self.text.len())?;
        if let Some(output) = &mut self.output {
            output.pop_all(self.position);
        }
        Ok(())
    }

    /// Colors `position..until` with the flat rules of `rule_set`.
    fn highlight_non_spans(&mut self, rule_set: &HighlightingRuleSet, until: usize) -> Result<(), DefinitionError> {
        debug_assert!(self.position <= until);
        if self.position == until {
            return Ok(());
        }
        if self.output.is_some() && !rule_set.rules.is_empty() {
            let haystack = &self.text[..until];
            let mut probes = vec![Probe::Unknown; rule_set.rules.len()];
            loop {
                for (probe, rule) in probes.iter_mut().zip(&rule_set.rules) {
                    probe.refresh(&rule.regex, haystack, self.position);
                }
                let Some((start, end, index)) = earliest(&probes) else {
                    break;
                };
                let rule = &rule_set.rules[index];
                if start == end {
                    return Err(DefinitionError::ZeroWidthRule {
                        pattern: rule.pattern().to_string(),
                    });
                }
                self.position = start;
                self.push_color(rule.color.as_ref());
                self.position = end;
                self.pop_color();
            }
        }
        self.position = until;
        Ok(())
    }

    fn push_color(&mut self, color: Option<&Arc<HighlightingColor>>) {
        if let Some(output) = &mut self.output {
            output.push(color, self.position);
        }
    }

    fn pop_color(&mut self) {
        if let Some(output) = &mut self.output {
            output.pop(self.position);
        }
    }
}

/// Builds sections from nested push/pop calls.
///
/// Pushing the color that was popped at exactly the same offset reopens the
/// popped section instead of starting a new one.
struct SectionBuilder {
    offsets: OffsetMap,
    sections: Vec<HighlightedSection>,
    /// Open sections by index; `None` for uncolored frames.
    stack: Vec<Option<usize>>,
    last_popped: Option<usize>,
}

impl SectionBuilder {
    fn new(text: &str, line_offset: usize) -> Self {
        Self {
            offsets: OffsetMap::new(text, line_offset),
            sections: Vec::new(),
            stack: Vec::new(),
            last_popped: None,
        }
    }

    fn push(&mut self, color: Option<&Arc<HighlightingColor>>, position: usize) {
        let Some(color) = color else {
            self.stack.push(None);
            return;
        };
        let offset = self.offsets.document_offset(position);
        let reopen = self.last_popped.take().filter(|&index| {
            let previous = &self.sections[index];
            previous.offset + previous.length == offset
                && (Arc::ptr_eq(&previous.color, color) || *previous.color == **color)
        });
        let index = match reopen {
            Some(index) => index,
            None => {
                self.sections
                    .push(HighlightedSection::new(offset, 0, Arc::clone(color)));
                self.sections.len() - 1
            }
        };
        self.stack.push(Some(index));
    }

    fn pop(&mut self, position: usize) {
        let Some(Some(index)) = self.stack.pop() else {
            return;
        };
        let end = self.offsets.document_offset(position);
        let section = &mut self.sections[index];
        section.length = end - section.offset;
        if section.length == 0 {
            // Everything pushed after an empty section is empty too and already gone.
            debug_assert_eq!(index, self.sections.len() - 1);
            self.sections.remove(index);
        } else {
            self.last_popped = Some(index);
        }
    }

    fn pop_all(&mut self, position: usize) {
        while !self.stack.is_empty() {
            self.pop(position);
        }
    }

    fn finish(self) -> Vec<HighlightedSection> {
        debug_assert!(self.stack.is_empty());
        self.sections
    }
}

/// Converts byte positions in the line text to document char offsets.
struct OffsetMap {
    line_offset: usize,
    /// Byte offset of every char; `None` for ASCII lines.
    char_starts: Option<Vec<usize>>,
}

impl OffsetMap {
    fn new(text: &str, line_offset: usize) -> Self {
        let char_starts = (!text.is_ascii()).then(|| text.char_indices().map(|(byte, _)| byte).collect());
        Self {
            line_offset,
            char_starts,
        }
    }

    fn document_offset(&self, byte: usize) -> usize {
        self.line_offset
            + match &self.char_starts {
                None => byte,
                Some(starts) => starts.partition_point(|&start| start < byte),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::definition::{DefinitionBuilder, SpanBuilder};
    use quill_core::LineDelimiter;

    fn line(number: usize, offset: usize, text: &str) -> DocumentLine {
        DocumentLine {
            line_number: number,
            offset,
            length: text.chars().count(),
            delimiter: LineDelimiter::Lf,
        }
    }

    fn named(builder: &mut DefinitionBuilder, name: &str, rgb: (u8, u8, u8)) -> Arc<HighlightingColor> {
        builder.add_color(name, HighlightingColor::new().with_foreground(Rgba::rgb(rgb.0, rgb.1, rgb.2)))
    }

    fn sections(line: &HighlightedLine) -> Vec<(usize, usize, &str)> {
        line.sections()
            .iter()
            .map(|s| (s.offset, s.length, s.color.name.as_deref().unwrap_or("")))
            .collect()
    }

    #[test]
    fn test_adjacent_rule_matches_coalesce() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        let digit = named(&mut builder, "Digit", (0, 0, 255));
        builder.add_rule(main, "[0-9]", Some(digit)).unwrap();
        let mut engine = HighlightingEngine::new(Arc::new(builder.build()));

        let text = "x123 4";
        let result = engine.highlight_line(&line(1, 0, text), text).unwrap();
        assert_eq!(sections(&result), vec![(1, 3, "Digit"), (5, 1, "Digit")]);
    }

    #[test]
    fn test_span_delimiters_outside_span_color() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        let string = named(&mut builder, "String", (163, 21, 21));
        let quote = named(&mut builder, "Quote", (0, 0, 0));
        builder
            .add_span(
                main,
                SpanBuilder::new("\"")
                    .end("\"")
                    .span_color(string)
                    .start_color(Arc::clone(&quote))
                    .end_color(quote)
                    .span_color_includes_start(false)
                    .span_color_includes_end(false),
            )
            .unwrap();
        let mut engine = HighlightingEngine::new(Arc::new(builder.build()));

        let text = r#"a "bc" d"#;
        let result = engine.highlight_line(&line(1, 10, text), text).unwrap();
        assert_eq!(
            sections(&result),
            vec![(12, 1, "Quote"), (13, 2, "String"), (15, 1, "Quote")]
        );
        assert!(engine.current_span_stack().is_empty());
    }

    #[test]
    fn test_open_span_continues_on_next_line() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        let comment = named(&mut builder, "Comment", (0, 128, 0));
        builder
            .add_span(main, SpanBuilder::new(r"/\*").end(r"\*/").span_color(comment))
            .unwrap();
        let mut engine = HighlightingEngine::new(Arc::new(builder.build()));

        let first = engine.highlight_line(&line(1, 0, "x /* a"), "x /* a").unwrap();
        assert_eq!(sections(&first), vec![(2, 4, "Comment")]);
        assert_eq!(engine.current_span_stack().len(), 1);

        let second = engine.highlight_line(&line(2, 7, "b */ y"), "b */ y").unwrap();
        assert_eq!(sections(&second), vec![(7, 4, "Comment")]);
        assert!(engine.current_span_stack().is_empty());
    }

    #[test]
    fn test_offsets_count_chars_not_bytes() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        let word = named(&mut builder, "Word", (1, 1, 1));
        builder.add_rule(main, "b+", Some(word)).unwrap();
        let mut engine = HighlightingEngine::new(Arc::new(builder.build()));

        let text = "äöbb";
        let result = engine.highlight_line(&line(1, 0, text), text).unwrap();
        assert_eq!(sections(&result), vec![(2, 2, "Word")]);
    }

    #[test]
    fn test_scan_skips_rules_but_tracks_spans() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        builder.add_rule(main, "x*", None).unwrap();
        builder
            .add_span(main, SpanBuilder::new("<").end(">").rule_set(main))
            .unwrap();
        let mut engine = HighlightingEngine::new(Arc::new(builder.build()));

        engine.scan_line("a < b").unwrap();
        assert_eq!(engine.current_span_stack().len(), 1);

        let err = engine.highlight_line(&line(2, 6, "c"), "c").unwrap_err();
        assert!(matches!(
            err,
            HighlightingError::DefinitionInvalid(DefinitionError::ZeroWidthRule { .. })
        ));
        assert_eq!(engine.current_span_stack().len(), 1);
    }
}
