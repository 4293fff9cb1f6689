//! The interface renderers use to obtain highlighting.

use std::sync::Arc;

use quill_core::Document;

use crate::color::HighlightingColor;
use crate::error::HighlightingError;
use crate::highlighted_line::HighlightedLine;

/// Produces highlighting for the lines of a document.
///
/// Line numbers are 1-based.
pub trait Highlighter {
    /// Highlights one line.
    fn highlight_line(&mut self, document: &dyn Document, line_number: usize) -> Result<HighlightedLine, HighlightingError>;

    /// Brings the state at the end of `line_number` up to date without
    /// producing output.
    fn update_highlighting_state(&mut self, document: &dyn Document, line_number: usize) -> Result<(), HighlightingError>;

    /// Opens a batch of lookups. Batches do not nest.
    fn begin_highlighting(&mut self) -> Result<(), HighlightingError>;

    /// Closes the batch opened by [`begin_highlighting`](Self::begin_highlighting).
    fn end_highlighting(&mut self) -> Result<(), HighlightingError>;

    /// Looks up a named color of the definition in use.
    fn named_color(&self, name: &str) -> Option<Arc<HighlightingColor>>;

    /// Color for text not covered by any section.
    fn default_text_color(&self) -> Option<Arc<HighlightingColor>> {
        None
    }
}
