#![warn(missing_docs)]
//! Quill Highlight - regex-driven incremental syntax highlighting
//!
//! # Overview
//!
//! `quill-highlight` colors documents provided through [`quill_core::Document`]:
//!
//! - **Definitions**: [`HighlightingDefinition`]s made of rule sets, spans and
//!   named colors, built in code with a [`DefinitionBuilder`] or compiled from
//!   YAML ([`DefinitionSpec`])
//! - **Line engine**: [`HighlightingEngine`] highlights one line given the
//!   [`SpanStack`] of spans still open from the line above
//! - **Document highlighter**: [`DocumentHighlighter`] caches the span stack at
//!   every line end, follows edits as a [`quill_core::LineTracker`] and
//!   rescans only what an edit made stale
//! - **Output**: [`HighlightedLine`] sections, merging of layered highlighters,
//!   HTML export and [`RichText`] models
//! - **Registry**: [`HighlightingManager`] looks definitions up by name or file
//!   extension and loads them on first use
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use quill_core::TextDocument;
//! use quill_highlight::{DocumentHighlighter, HighlightingDefinition, NoTheme};
//!
//! let definition = HighlightingDefinition::from_yaml(
//!     r##"
//! name: Ini
//! colors:
//!   Comment: { foreground: "#008000" }
//! main:
//!   spans:
//!     - begin: ";"
//!       color: Comment
//! "##,
//! )
//! .unwrap();
//!
//! let text = "key = value ; note";
//! let document = TextDocument::new(text);
//! let mut highlighter = DocumentHighlighter::new(&document, Arc::new(definition));
//! let line = highlighter.highlight_line(&document, 1).unwrap();
//! assert_eq!(line.sections().len(), 1);
//! assert_eq!(line.sections()[0].offset, 12);
//! assert_eq!(
//!     line.to_html(text, &NoTheme).unwrap(),
//!     r#"key = value <span style="color: #008000;">; note</span>"#
//! );
//! ```
//!
//! # Module Description
//!
//! - [`color`] - colors, brushes and font attributes
//! - [`definition`] - definitions, the builder and the YAML compiler
//! - [`engine`] - single-line highlighting
//! - [`document_highlighter`] - cached, incremental document highlighting
//! - [`multi_highlighter`] - layering several highlighters
//! - [`highlighted_line`] - per-line output and merging
//! - [`rich_text`] - rich text models and HTML output
//! - [`manager`] - definition registry
//! - [`error`] - error types

pub mod color;
pub mod definition;
pub mod document_highlighter;
pub mod engine;
pub mod error;
pub mod highlighted_line;
pub mod highlighter;
pub mod manager;
pub mod multi_highlighter;
pub mod rich_text;

pub use color::{BrushContext, FontStyle, FontWeight, HighlightingBrush, HighlightingColor, NoTheme, Rgba};
pub use definition::{
    DefinitionBuilder, DefinitionResolver, DefinitionSpec, HighlightingDefinition, HighlightingRule,
    HighlightingRuleSet, HighlightingSpan, NoDefinitions, RuleSetId, SpanBuilder, SpanId, compile_definition,
};
pub use document_highlighter::{DocumentHighlighter, LineState, StateChangedCallback};
pub use engine::{HighlightingEngine, SpanStack};
pub use error::{DefinitionError, HighlightingError};
pub use highlighted_line::{HighlightedLine, HighlightedSection};
pub use highlighter::Highlighter;
pub use manager::HighlightingManager;
pub use multi_highlighter::MultiHighlighter;
pub use rich_text::{HtmlRichTextWriter, RichText, RichTextModel, RichTextWriter, html_fragment};
