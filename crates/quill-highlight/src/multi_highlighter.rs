//! Layering several highlighters over one document.

use std::sync::Arc;

use quill_core::Document;

use crate::color::HighlightingColor;
use crate::error::HighlightingError;
use crate::highlighted_line::HighlightedLine;
use crate::highlighter::Highlighter;

/// Combines the output of nested highlighters.
///
/// Lines are merged in registration order, so sections from later
/// highlighters nest inside (and take precedence over) earlier ones.
#[derive(Default)]
pub struct MultiHighlighter {
    nested: Vec<Box<dyn Highlighter + Send>>,
}

impl MultiHighlighter {
    /// Creates an empty combination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a highlighter.
    pub fn push(&mut self, highlighter: impl Highlighter + Send + 'static) {
        self.nested.push(Box::new(highlighter));
    }

    /// Number of nested highlighters.
    pub fn len(&self) -> usize {
        self.nested.len()
    }

    /// Returns `true` if nothing is nested.
    pub fn is_empty(&self) -> bool {
        self.nested.is_empty()
    }
}

impl Highlighter for MultiHighlighter {
    fn highlight_line(&mut self, document: &dyn Document, line_number: usize) -> Result<HighlightedLine, HighlightingError> {
        let line = document.line_by_number(line_number)?;
        let mut merged = HighlightedLine::new(&line);
        for highlighter in &mut self.nested {
            let additional = highlighter.highlight_line(document, line_number)?;
            merged.merge_with(&additional);
        }
        Ok(merged)
    }

    fn update_highlighting_state(&mut self, document: &dyn Document, line_number: usize) -> Result<(), HighlightingError> {
        self.nested
            .iter_mut()
            .try_for_each(|highlighter| highlighter.update_highlighting_state(document, line_number))
    }

    fn begin_highlighting(&mut self) -> Result<(), HighlightingError> {
        for opened in 0..self.nested.len() {
            if let Err(error) = self.nested[opened].begin_highlighting() {
                // Close the groups already opened; the first error is the one reported.
                for highlighter in &mut self.nested[..opened] {
                    let _ = highlighter.end_highlighting();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn end_highlighting(&mut self) -> Result<(), HighlightingError> {
        self.nested
            .iter_mut()
            .try_for_each(|highlighter| highlighter.end_highlighting())
    }

    fn named_color(&self, name: &str) -> Option<Arc<HighlightingColor>> {
        self.nested
            .iter()
            .find_map(|highlighter| highlighter.named_color(name))
    }

    fn default_text_color(&self) -> Option<Arc<HighlightingColor>> {
        self.nested
            .iter()
            .find_map(|highlighter| highlighter.default_text_color())
    }
}

impl std::fmt::Debug for MultiHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHighlighter")
            .field("nested", &self.nested.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::definition::{DefinitionBuilder, HighlightingDefinition, SpanBuilder};
    use crate::document_highlighter::DocumentHighlighter;
    use quill_core::TextDocument;

    fn comments() -> Arc<HighlightingDefinition> {
        let mut builder = DefinitionBuilder::new("Comments");
        let main = builder.main_rule_set();
        let comment = builder.add_color("Comment", HighlightingColor::new().with_foreground(Rgba::rgb(0, 128, 0)));
        builder.add_span(main, SpanBuilder::new("//").span_color(comment)).unwrap();
        Arc::new(builder.build())
    }

    fn todos() -> Arc<HighlightingDefinition> {
        let mut builder = DefinitionBuilder::new("Todos");
        let main = builder.main_rule_set();
        let todo = builder.add_color("Todo", HighlightingColor::new().with_underline(true));
        builder.add_rule(main, "TODO", Some(todo)).unwrap();
        Arc::new(builder.build())
    }

    #[test]
    fn test_merges_nested_output_in_order() {
        let document = TextDocument::new("x = 1; // TODO fix");
        let mut multi = MultiHighlighter::new();
        multi.push(DocumentHighlighter::new(&document, comments()));
        multi.push(DocumentHighlighter::new(&document, todos()));
        assert_eq!(multi.len(), 2);

        let line = multi.highlight_line(&document, 1).unwrap();
        let ranges: Vec<_> = line.sections().iter().map(|s| (s.offset, s.length)).collect();
        assert_eq!(ranges, vec![(7, 11), (10, 4)]);
        assert!(line.is_well_formed());
    }

    #[test]
    fn test_forwards_groups_and_colors() {
        let document = TextDocument::new("a");
        let mut multi = MultiHighlighter::new();
        multi.push(DocumentHighlighter::new(&document, comments()));
        multi.push(DocumentHighlighter::new(&document, todos()));

        multi.begin_highlighting().unwrap();
        assert_eq!(multi.begin_highlighting(), Err(HighlightingError::GroupAlreadyOpen));
        multi.end_highlighting().unwrap();

        assert!(multi.named_color("Todo").is_some());
        assert!(multi.named_color("Comment").is_some());
        assert!(multi.named_color("Missing").is_none());
        multi.update_highlighting_state(&document, 1).unwrap();
    }

    #[test]
    fn test_failed_begin_closes_opened_groups() {
        let document = TextDocument::new("a");
        let mut disposed = DocumentHighlighter::new(&document, todos());
        disposed.dispose();
        let mut multi = MultiHighlighter::new();
        multi.push(DocumentHighlighter::new(&document, comments()));
        multi.push(disposed);

        assert_eq!(multi.begin_highlighting(), Err(HighlightingError::Disposed));
        assert_eq!(multi.begin_highlighting(), Err(HighlightingError::Disposed));
        assert_eq!(multi.nested[0].end_highlighting(), Err(HighlightingError::GroupNotOpen));
    }
}
