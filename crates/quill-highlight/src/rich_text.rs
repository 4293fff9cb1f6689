//! Rendering sinks and flattened style runs.
//!
//! [`RichTextWriter`] receives `begin_span` / `write_text` / `end_span` calls in
//! document order, with spans properly nested. [`HtmlRichTextWriter`] turns
//! them into HTML; [`RichTextModel`] stores styles per offset without nesting.

use std::fmt::{self, Write as _};

use quill_core::{Document, DocumentError};

use crate::color::{BrushContext, HighlightingColor};
use crate::error::HighlightingError;
use crate::highlighted_line::{HighlightedLine, HighlightedSection};
use crate::highlighter::Highlighter;

/// Receives highlighted text.
pub trait RichTextWriter {
    /// Opens a span styled with `color`.
    fn begin_span(&mut self, color: &HighlightingColor) -> fmt::Result;

    /// Closes the innermost open span.
    fn end_span(&mut self) -> fmt::Result;

    /// Writes text inside the currently open spans.
    fn write_text(&mut self, text: &str) -> fmt::Result;
}

/// Writes HTML: `<span style="...">` per span, escaped text, `<br>` per newline.
pub struct HtmlRichTextWriter<'c, W> {
    out: W,
    context: &'c dyn BrushContext,
    open_spans: usize,
    after_space: bool,
}

impl<'c, W: fmt::Write> HtmlRichTextWriter<'c, W> {
    /// Writes into `out`, resolving theme brushes through `context`.
    pub fn new(out: W, context: &'c dyn BrushContext) -> Self {
        Self {
            out,
            context,
            open_spans: 0,
            after_space: false,
        }
    }

    /// Number of spans opened and not yet closed.
    pub fn open_spans(&self) -> usize {
        self.open_spans
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: fmt::Write> RichTextWriter for HtmlRichTextWriter<'_, W> {
    fn begin_span(&mut self, color: &HighlightingColor) -> fmt::Result {
        let css = color.to_css(self.context);
        self.open_spans += 1;
        if css.is_empty() {
            self.out.write_str("<span>")
        } else {
            self.out.write_str("<span style=\"")?;
            write_escaped(&mut self.out, &css)?;
            self.out.write_str("\">")
        }
    }

    fn end_span(&mut self) -> fmt::Result {
        self.open_spans = self.open_spans.saturating_sub(1);
        self.out.write_str("</span>")
    }

    fn write_text(&mut self, text: &str) -> fmt::Result {
        for ch in text.chars() {
            match ch {
                ' ' if self.after_space => self.out.write_str("&nbsp;")?,
                '\t' => self.out.write_str("&nbsp;&nbsp;&nbsp;&nbsp;")?,
                '\r' => {}
                '\n' => self.out.write_str("<br>\n")?,
                _ => write_escaped(&mut self.out, ch.encode_utf8(&mut [0; 4]))?,
            }
            self.after_space = ch == ' ';
        }
        Ok(())
    }
}

fn write_escaped(out: &mut impl fmt::Write, text: &str) -> fmt::Result {
    for ch in text.chars() {
        match ch {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            '\'' => out.write_str("&#39;")?,
            _ => out.write_char(ch)?,
        }
    }
    Ok(())
}

/// Styles stored as runs: each entry applies from its offset up to the next one.
///
/// Offsets are char offsets relative to the start of the text the model
/// describes. The first run always starts at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichTextModel {
    offsets: Vec<usize>,
    colors: Vec<HighlightingColor>,
}

impl Default for RichTextModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RichTextModel {
    /// A model with no styles.
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            colors: vec![HighlightingColor::new()],
        }
    }

    fn run_index(&self, offset: usize) -> usize {
        self.offsets.partition_point(|&o| o <= offset) - 1
    }

    /// Makes `offset` the start of a run and returns that run's index.
    fn split_at(&mut self, offset: usize) -> usize {
        let index = self.run_index(offset);
        if self.offsets[index] == offset {
            return index;
        }
        let color = self.colors[index].clone();
        self.offsets.insert(index + 1, offset);
        self.colors.insert(index + 1, color);
        index + 1
    }

    fn coalesce(&mut self) {
        let mut i = 1;
        while i < self.offsets.len() {
            if self.colors[i] == self.colors[i - 1] {
                self.offsets.remove(i);
                self.colors.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// The style at `offset`.
    pub fn highlighting_at(&self, offset: usize) -> &HighlightingColor {
        &self.colors[self.run_index(offset)]
    }

    /// Replaces the style of `offset..offset + length`.
    pub fn set_highlighting(&mut self, offset: usize, length: usize, color: &HighlightingColor) {
        if length == 0 {
            return;
        }
        let start = self.split_at(offset);
        let end = self.split_at(offset + length);
        self.offsets.drain(start + 1..end);
        self.colors.drain(start + 1..end);
        self.colors[start] = color.clone();
        self.coalesce();
    }

    /// Merges `color` into the existing styles of `offset..offset + length`.
    pub fn apply_highlighting(&mut self, offset: usize, length: usize, color: &HighlightingColor) {
        if length == 0 {
            return;
        }
        let start = self.split_at(offset);
        let end = self.split_at(offset + length);
        for existing in &mut self.colors[start..end] {
            existing.merge_with(color);
        }
        self.coalesce();
    }

    /// Moves run boundaries after `removed` chars at `offset` were replaced by
    /// `inserted` chars. Text inserted at a boundary takes the preceding style.
    pub fn update_offsets(&mut self, offset: usize, removed: usize, inserted: usize) {
        for boundary in self.offsets.iter_mut().skip(1) {
            if *boundary >= offset + removed {
                *boundary = *boundary - removed + inserted;
            } else if *boundary > offset {
                *boundary = offset;
            }
        }
        let mut i = 1;
        while i < self.offsets.len() {
            if self.offsets[i] == self.offsets[i - 1] {
                self.offsets.remove(i - 1);
                self.colors.remove(i - 1);
            } else {
                i += 1;
            }
        }
        self.coalesce();
    }

    /// Runs as `(start offset, style)`.
    pub fn runs(&self) -> impl Iterator<Item = (usize, &HighlightingColor)> {
        self.offsets.iter().copied().zip(&self.colors)
    }

    /// Styled runs intersecting `offset..offset + length`, clipped to it.
    /// Unstyled runs are left out.
    pub fn sections(&self, offset: usize, length: usize) -> Vec<HighlightedSection> {
        let end = offset + length;
        let mut sections = Vec::new();
        for (i, (start, color)) in self.runs().enumerate() {
            let run_end = self.offsets.get(i + 1).copied().unwrap_or(usize::MAX);
            let (from, to) = (start.max(offset), run_end.min(end));
            if from < to && !color.is_empty_for_merge() {
                sections.push(HighlightedSection::new(from, to - from, color.clone().into()));
            }
        }
        sections
    }
}

/// Text paired with its styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichText {
    text: String,
    model: RichTextModel,
}

impl RichText {
    /// Pairs `text` with `model`.
    pub fn new(text: impl Into<String>, model: RichTextModel) -> Self {
        Self {
            text: text.into(),
            model,
        }
    }

    /// The plain text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The styles.
    pub fn model(&self) -> &RichTextModel {
        &self.model
    }

    /// Number of chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Returns `true` if the text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Feeds the text to `writer`, one span per styled run.
    pub fn write_to(&self, writer: &mut dyn RichTextWriter) -> fmt::Result {
        let mut chars = self.text.char_indices().map(|(byte, _)| byte).peekable();
        let mut char_offset = 0;
        let runs: Vec<(usize, &HighlightingColor)> = self.model.runs().collect();
        for (i, &(_, color)) in runs.iter().enumerate() {
            let run_end = runs.get(i + 1).map_or(usize::MAX, |&(offset, _)| offset);
            let Some(&from) = chars.peek() else {
                break;
            };
            while char_offset < run_end && chars.next().is_some() {
                char_offset += 1;
            }
            let to = chars.peek().copied().unwrap_or(self.text.len());
            if from == to {
                continue;
            }
            let text = &self.text[from..to];
            if color.is_empty_for_merge() {
                writer.write_text(text)?;
            } else {
                writer.begin_span(color)?;
                writer.write_text(text)?;
                writer.end_span()?;
            }
        }
        Ok(())
    }

    /// Renders as HTML.
    pub fn to_html(&self, context: &dyn BrushContext) -> Result<String, HighlightingError> {
        let mut html = String::new();
        self.write_to(&mut HtmlRichTextWriter::new(&mut html, context))?;
        Ok(html)
    }
}

/// Renders `offset..offset + length` of `document` as HTML.
///
/// Each line is highlighted by `highlighter` when one is given. Line breaks
/// inside the range become `<br>`.
pub fn html_fragment(
    document: &dyn Document,
    mut highlighter: Option<&mut dyn Highlighter>,
    offset: usize,
    length: usize,
    context: &dyn BrushContext,
) -> Result<String, HighlightingError> {
    let text_length = document.text_length();
    let end = offset
        .checked_add(length)
        .filter(|&end| end <= text_length)
        .ok_or(DocumentError::OffsetOutOfRange {
            offset,
            length,
            text_length,
        })?;

    let mut html = String::new();
    let mut writer = HtmlRichTextWriter::new(&mut html, context);
    for line_number in line_number_at(document, offset)?..=document.line_count() {
        let line = document.line_by_number(line_number)?;
        if line.offset > end || (line.offset == end && line.offset > offset) {
            break;
        }
        let text = document.line_text(&line)?;
        let highlighted = match highlighter.as_deref_mut() {
            Some(highlighter) => highlighter.highlight_line(document, line_number)?,
            None => HighlightedLine::new(&line),
        };
        let line_end = line.offset + line.length;
        let (from, to) = (offset.max(line.offset).min(line_end), end.min(line_end));
        if from < to {
            highlighted.write_range_to(&text, from, to, &mut writer)?;
        }
        // The range may start inside the delimiter of a CRLF line.
        if offset.max(line_end) < end.min(line.offset + line.total_length()) {
            writer.write_text("\n")?;
        }
    }
    Ok(html)
}

fn line_number_at(document: &dyn Document, offset: usize) -> Result<usize, HighlightingError> {
    let (mut low, mut high) = (1, document.line_count());
    while low < high {
        let mid = (low + high).div_ceil(2);
        if document.line_by_number(mid)?.offset <= offset {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{FontWeight, NoTheme, Rgba};
    use quill_core::TextDocument;

    fn bold() -> HighlightingColor {
        HighlightingColor::new().with_font_weight(FontWeight::Bold)
    }

    fn red() -> HighlightingColor {
        HighlightingColor::new().with_foreground(Rgba::rgb(255, 0, 0))
    }

    #[test]
    fn test_set_and_apply_highlighting() {
        let mut model = RichTextModel::new();
        model.set_highlighting(2, 4, &bold());
        model.apply_highlighting(4, 4, &red());

        assert!(model.highlighting_at(0).is_empty_for_merge());
        assert_eq!(model.highlighting_at(2), &bold());
        let mut both = bold();
        both.merge_with(&red());
        assert_eq!(model.highlighting_at(5), &both);
        assert_eq!(model.highlighting_at(7), &red());
        assert!(model.highlighting_at(8).is_empty_for_merge());

        let offsets: Vec<usize> = model.runs().map(|(o, _)| o).collect();
        assert_eq!(offsets, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_set_highlighting_coalesces_equal_runs() {
        let mut model = RichTextModel::new();
        model.set_highlighting(0, 2, &red());
        model.set_highlighting(2, 2, &red());
        assert_eq!(model.runs().count(), 2);
        let sections = model.sections(0, 10);
        assert_eq!(sections.len(), 1);
        assert_eq!((sections[0].offset, sections[0].length), (0, 4));
    }

    #[test]
    fn test_update_offsets() {
        let mut model = RichTextModel::new();
        model.set_highlighting(4, 4, &red());
        model.update_offsets(0, 0, 2);
        assert_eq!(model.sections(0, 20)[0].offset, 6);
        model.update_offsets(5, 3, 0);
        let section = &model.sections(0, 20)[0];
        assert_eq!((section.offset, section.length), (5, 2));
        model.update_offsets(0, 10, 0);
        assert!(model.sections(0, 20).is_empty());
    }

    #[test]
    fn test_rich_text_html() {
        let mut model = RichTextModel::new();
        model.set_highlighting(0, 2, &bold());
        let text = RichText::new("fn  <x>", model);
        assert_eq!(
            text.to_html(&NoTheme).unwrap(),
            "<span style=\"font-weight: bold;\">fn</span> &nbsp;&lt;x&gt;"
        );
    }

    #[test]
    fn test_html_fragment_without_highlighter() {
        let document = TextDocument::new("a&b\ncd\nef");
        let html = html_fragment(&document, None, 2, 5, &NoTheme).unwrap();
        assert_eq!(html, "b<br>\ncd<br>\n");
        let err = html_fragment(&document, None, 5, 10, &NoTheme).unwrap_err();
        assert!(matches!(err, HighlightingError::Document(DocumentError::OffsetOutOfRange { .. })));
    }

    #[test]
    fn test_html_fragment_starting_inside_crlf() {
        let document = TextDocument::new("ab\r\ncd");
        assert_eq!(html_fragment(&document, None, 3, 2, &NoTheme).unwrap(), "<br>\nc");
        assert_eq!(html_fragment(&document, None, 3, 0, &NoTheme).unwrap(), "");
        assert_eq!(html_fragment(&document, None, 2, 1, &NoTheme).unwrap(), "<br>\n");
    }
}
