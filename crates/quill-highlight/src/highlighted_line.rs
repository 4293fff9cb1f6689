//! Highlighting output for one line.

use std::cmp::Ordering;
use std::sync::Arc;

use quill_core::{DocumentLine, Segment, SimpleSegment};

use crate::color::{BrushContext, HighlightingColor};
use crate::error::HighlightingError;
use crate::rich_text::{HtmlRichTextWriter, RichText, RichTextModel, RichTextWriter};

/// A colored range of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedSection {
    /// Document char offset.
    pub offset: usize,
    /// Number of chars covered.
    pub length: usize,
    /// Color applied to the range.
    pub color: Arc<HighlightingColor>,
}

impl HighlightedSection {
    /// Creates a section.
    pub fn new(offset: usize, length: usize, color: Arc<HighlightingColor>) -> Self {
        Self {
            offset,
            length,
            color,
        }
    }
}

impl Segment for HighlightedSection {
    fn offset(&self) -> usize {
        self.offset
    }

    fn length(&self) -> usize {
        self.length
    }
}

/// The sections covering one document line.
///
/// Sections are sorted by offset; any two are either disjoint or nested, and
/// an enclosing section comes before the sections it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedLine {
    line_number: usize,
    offset: usize,
    length: usize,
    sections: Vec<HighlightedSection>,
}

impl HighlightedLine {
    /// An unhighlighted line.
    pub fn new(line: &DocumentLine) -> Self {
        Self {
            line_number: line.line_number,
            offset: line.offset,
            length: line.length,
            sections: Vec::new(),
        }
    }

    /// A line with the given sections, which must already be well formed.
    pub fn with_sections(line: &DocumentLine, sections: Vec<HighlightedSection>) -> Self {
        Self {
            sections,
            ..Self::new(line)
        }
    }

    /// 1-based line number.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Document offset of the line start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Line length, excluding the delimiter.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Document offset of the line end, excluding the delimiter.
    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// The sections, outer before inner.
    pub fn sections(&self) -> &[HighlightedSection] {
        &self.sections
    }

    /// Mutable access to the sections. Callers must keep them well formed.
    pub fn sections_mut(&mut self) -> &mut Vec<HighlightedSection> {
        &mut self.sections
    }

    /// Returns `true` if every section lies inside the line and the sections
    /// are sorted, nested or disjoint, with containers first.
    pub fn is_well_formed(&self) -> bool {
        let line_end = self.end_offset();
        self.sections.iter().enumerate().all(|(i, outer)| {
            outer.offset >= self.offset
                && outer.end_offset() <= line_end
                && self.sections[i + 1..].iter().all(|inner| {
                    inner.offset >= outer.end_offset()
                        || (inner.offset >= outer.offset && inner.end_offset() <= outer.end_offset())
                })
        })
    }

    /// Overlays the sections of `additional` onto this line.
    ///
    /// Incoming sections are split wherever they would cross the boundary of an
    /// existing section, so the result stays well formed. On overlap the
    /// incoming fragments are nested inside the existing sections.
    pub fn merge_with(&mut self, additional: &HighlightedLine) {
        debug_assert!(self.is_well_formed());
        debug_assert!(additional.is_well_formed());

        let mut pos = 0;
        let mut active_ends = vec![self.end_offset()];
        for incoming in &additional.sections {
            let mut start = incoming.offset;
            while pos < self.sections.len() {
                let existing = &self.sections[pos];
                if incoming.offset < existing.offset {
                    break;
                }
                pop_ended(&mut active_ends, existing.offset);
                active_ends.push(existing.end_offset());
                pos += 1;
            }

            let mut enclosing = active_ends.clone();
            let mut i = pos;
            while i < self.sections.len() {
                let (existing_start, existing_end) = (self.sections[i].offset, self.sections[i].end_offset());
                if incoming.end_offset() <= existing_start {
                    break;
                }
                self.insert_fragment(&mut i, &mut start, existing_start, &incoming.color, &mut enclosing);
                pop_ended(&mut enclosing, existing_start);
                enclosing.push(existing_end);
                i += 1;
            }
            self.insert_fragment(&mut i, &mut start, incoming.end_offset(), &incoming.color, &mut enclosing);
        }

        debug_assert!(self.is_well_formed());
    }

    fn insert_fragment(
        &mut self,
        pos: &mut usize,
        start: &mut usize,
        end: usize,
        color: &Arc<HighlightingColor>,
        enclosing: &mut Vec<usize>,
    ) {
        if *start >= end {
            return;
        }
        while enclosing.last().is_some_and(|&e| e <= *start) {
            enclosing.pop();
        }
        while let Some(&boundary) = enclosing.last().filter(|&&e| e < end) {
            enclosing.pop();
            if boundary > *start {
                self.sections
                    .insert(*pos, HighlightedSection::new(*start, boundary - *start, Arc::clone(color)));
                *pos += 1;
                *start = boundary;
            }
        }
        if end > *start {
            self.sections
                .insert(*pos, HighlightedSection::new(*start, end - *start, Arc::clone(color)));
            *pos += 1;
            *start = end;
        }
    }

    /// Feeds the whole line to `writer`. `text` is the line text.
    pub fn write_to(&self, text: &str, writer: &mut dyn RichTextWriter) -> Result<(), HighlightingError> {
        self.write_range_to(text, self.offset, self.end_offset(), writer)
    }

    /// Feeds the document range `start..end` of this line to `writer`.
    ///
    /// Sections overlapping the range are opened and closed around the text,
    /// even when they extend past it.
    pub fn write_range_to(
        &self,
        text: &str,
        start: usize,
        end: usize,
        writer: &mut dyn RichTextWriter,
    ) -> Result<(), HighlightingError> {
        let line_end = self.end_offset();
        if start < self.offset || end < start || end > line_end {
            return Err(HighlightingError::RangeOutOfLine {
                start,
                end,
                line_start: self.offset,
                line_end,
            });
        }

        let requested = SimpleSegment::new(start, end - start);
        let mut elements = Vec::with_capacity(self.sections.len() * 2);
        for (nesting, section) in self.sections.iter().enumerate() {
            if requested.intersection(section).is_some() {
                elements.push(Boundary {
                    offset: section.offset,
                    nesting,
                    is_end: false,
                    color: &section.color,
                });
                elements.push(Boundary {
                    offset: section.end_offset(),
                    nesting,
                    is_end: true,
                    color: &section.color,
                });
            }
        }
        elements.sort_by(Boundary::order);

        let text = LineText::new(text, self.offset);
        let mut text_offset = start;
        for element in &elements {
            let next = element.offset.min(end);
            if next > text_offset {
                writer.write_text(text.slice(text_offset, next))?;
            }
            text_offset = text_offset.max(next);
            if element.is_end {
                writer.end_span()?;
            } else {
                writer.begin_span(element.color)?;
            }
        }
        if end > text_offset {
            writer.write_text(text.slice(text_offset, end))?;
        }
        Ok(())
    }

    /// Renders the line as HTML.
    pub fn to_html(&self, text: &str, context: &dyn BrushContext) -> Result<String, HighlightingError> {
        let mut html = String::new();
        let mut writer = HtmlRichTextWriter::new(&mut html, context);
        self.write_to(text, &mut writer)?;
        Ok(html)
    }

    /// The sections flattened into per-offset styles, relative to the line start.
    pub fn to_rich_text_model(&self) -> RichTextModel {
        let mut model = RichTextModel::new();
        for section in &self.sections {
            model.apply_highlighting(section.offset - self.offset, section.length, &section.color);
        }
        model
    }

    /// Pairs the line text with its flattened styles.
    pub fn to_rich_text(&self, text: &str) -> RichText {
        RichText::new(text, self.to_rich_text_model())
    }
}

fn pop_ended(ends: &mut Vec<usize>, offset: usize) {
    while ends.last().is_some_and(|&end| offset >= end) {
        ends.pop();
    }
}

struct Boundary<'a> {
    offset: usize,
    nesting: usize,
    is_end: bool,
    color: &'a HighlightingColor,
}

impl Boundary<'_> {
    /// Ends sort before starts at the same offset; starts open outer first and
    /// ends close inner first.
    fn order(a: &Self, b: &Self) -> Ordering {
        a.offset.cmp(&b.offset).then_with(|| match (a.is_end, b.is_end) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => b.nesting.cmp(&a.nesting),
            (false, false) => a.nesting.cmp(&b.nesting),
        })
    }
}

/// Line text addressed by document char offsets.
struct LineText<'a> {
    text: &'a str,
    line_offset: usize,
    boundaries: Option<Vec<usize>>,
}

impl<'a> LineText<'a> {
    fn new(text: &'a str, line_offset: usize) -> Self {
        let boundaries = (!text.is_ascii()).then(|| {
            text.char_indices()
                .map(|(byte, _)| byte)
                .chain(std::iter::once(text.len()))
                .collect()
        });
        Self {
            text,
            line_offset,
            boundaries,
        }
    }

    fn byte(&self, offset: usize) -> usize {
        let index = offset - self.line_offset;
        match &self.boundaries {
            None => index.min(self.text.len()),
            Some(boundaries) => boundaries.get(index).copied().unwrap_or(self.text.len()),
        }
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.byte(start)..self.byte(end)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{NoTheme, Rgba};
    use quill_core::LineDelimiter;
    use std::fmt;

    fn line(offset: usize, length: usize) -> DocumentLine {
        DocumentLine {
            line_number: 1,
            offset,
            length,
            delimiter: LineDelimiter::None,
        }
    }

    fn color(name: &str) -> Arc<HighlightingColor> {
        let mut color = HighlightingColor::new().with_foreground(Rgba::rgb(0, 0, 0));
        color.name = Some(name.to_string());
        Arc::new(color)
    }

    fn ranges(line: &HighlightedLine) -> Vec<(usize, usize, String)> {
        line.sections()
            .iter()
            .map(|s| (s.offset, s.end_offset(), s.color.name.clone().unwrap_or_default()))
            .collect()
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl RichTextWriter for Recorder {
        fn begin_span(&mut self, color: &HighlightingColor) -> fmt::Result {
            self.0.push(format!("<{}>", color.name.as_deref().unwrap_or("?")));
            Ok(())
        }

        fn end_span(&mut self) -> fmt::Result {
            self.0.push("</>".to_string());
            Ok(())
        }

        fn write_text(&mut self, text: &str) -> fmt::Result {
            self.0.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_merge_respects_existing_boundaries() {
        let mut base = HighlightedLine::with_sections(
            &line(0, 10),
            vec![
                HighlightedSection::new(0, 10, color("outer")),
                HighlightedSection::new(2, 2, color("inner")),
            ],
        );
        let overlay = HighlightedLine::with_sections(&line(0, 10), vec![HighlightedSection::new(1, 2, color("new"))]);
        base.merge_with(&overlay);
        assert_eq!(
            ranges(&base),
            vec![
                (0, 10, "outer".to_string()),
                (1, 2, "new".to_string()),
                (2, 4, "inner".to_string()),
                (2, 3, "new".to_string()),
            ]
        );
        assert!(base.is_well_formed());
    }

    #[test]
    fn test_merge_into_empty_line_copies_sections() {
        let mut base = HighlightedLine::new(&line(5, 10));
        let overlay = HighlightedLine::with_sections(
            &line(5, 10),
            vec![
                HighlightedSection::new(5, 4, color("a")),
                HighlightedSection::new(6, 1, color("b")),
            ],
        );
        base.merge_with(&overlay);
        assert_eq!(base.sections(), overlay.sections());
    }

    #[test]
    fn test_merge_splits_across_adjacent_sections() {
        let mut base = HighlightedLine::with_sections(
            &line(0, 10),
            vec![
                HighlightedSection::new(0, 2, color("x")),
                HighlightedSection::new(2, 2, color("y")),
            ],
        );
        let overlay = HighlightedLine::with_sections(&line(0, 10), vec![HighlightedSection::new(3, 2, color("z"))]);
        base.merge_with(&overlay);
        assert_eq!(
            ranges(&base),
            vec![
                (0, 2, "x".to_string()),
                (2, 4, "y".to_string()),
                (3, 4, "z".to_string()),
                (4, 5, "z".to_string()),
            ]
        );
    }

    #[test]
    fn test_is_well_formed_rejects_partial_overlap() {
        let line = HighlightedLine::with_sections(
            &line(0, 10),
            vec![
                HighlightedSection::new(0, 4, color("a")),
                HighlightedSection::new(2, 4, color("b")),
            ],
        );
        assert!(!line.is_well_formed());
    }

    #[test]
    fn test_write_range_clips_sections() {
        let highlighted = HighlightedLine::with_sections(
            &line(10, 8),
            vec![
                HighlightedSection::new(10, 8, color("outer")),
                HighlightedSection::new(12, 2, color("inner")),
            ],
        );
        let mut recorder = Recorder::default();
        highlighted
            .write_range_to("abcdéfgh", 13, 16, &mut recorder)
            .unwrap();
        assert_eq!(recorder.0, vec!["<outer>", "<inner>", "d", "</>", "éf", "</>"]);

        let err = highlighted.write_range_to("abcdéfgh", 9, 12, &mut recorder).unwrap_err();
        assert!(matches!(err, HighlightingError::RangeOutOfLine { line_start: 10, line_end: 18, .. }));
    }

    #[test]
    fn test_to_html() {
        let comment = Arc::new(HighlightingColor::new().with_foreground(Rgba::rgb(0, 128, 0)));
        let highlighted = HighlightedLine::with_sections(&line(0, 6), vec![HighlightedSection::new(2, 4, comment)]);
        assert_eq!(
            highlighted.to_html("a<//xy", &NoTheme).unwrap(),
            r#"a&lt;<span style="color: #008000;">//xy</span>"#
        );
    }
}
