//! Error types for definitions and highlighting.

use quill_core::{DocumentError, RopeError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// A broken highlighting definition.
pub enum DefinitionError {
    #[error("regex compile error for pattern '{pattern}': {message}")]
    /// A regex pattern failed to compile.
    Regex {
        /// The regex pattern string.
        pattern: String,
        /// The compiler error message.
        message: String,
    },

    #[error("rule pattern '{pattern}' matched an empty string")]
    /// A rule matched zero characters, which would never advance.
    ZeroWidthRule {
        /// The offending pattern.
        pattern: String,
    },

    #[error("span start pattern '{start}' (end '{end}') matched an empty string")]
    /// A span start matched zero characters, which would never advance.
    ZeroWidthSpan {
        /// The offending start pattern.
        start: String,
        /// The span's end pattern.
        end: String,
    },

    #[error("unknown color '{0}'")]
    /// A referenced color name does not exist.
    UnknownColor(String),

    #[error("unknown rule set '{0}'")]
    /// A referenced rule set name does not exist.
    UnknownRuleSet(String),

    #[error("unknown highlighting definition '{0}'")]
    /// A referenced definition is not registered.
    UnknownDefinition(String),

    #[error("cyclic reference while loading highlighting definition '{0}'")]
    /// A delay-loaded definition (indirectly) requested itself.
    CyclicReference(String),

    #[error("import cycle detected involving rule set '{0}'")]
    /// Rule set imports formed a cycle.
    CyclicImport(String),

    #[error("invalid color value '{value}': {message}")]
    /// A brush or color value could not be parsed.
    InvalidColor {
        /// The rejected value.
        value: String,
        /// What is wrong with it.
        message: String,
    },

    #[error("YAML parse error: {0}")]
    /// YAML parsing failed.
    Yaml(String),

    #[error("I/O error reading '{path}': {message}")]
    /// Reading a definition file failed.
    Io {
        /// The file that could not be read.
        path: String,
        /// The underlying error message.
        message: String,
    },
}

impl From<serde_yaml::Error> for DefinitionError {
    fn from(error: serde_yaml::Error) -> Self {
        DefinitionError::Yaml(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced while highlighting.
pub enum HighlightingError {
    #[error("highlighting definition invalid: {0}")]
    /// The definition in use is broken.
    DefinitionInvalid(#[from] DefinitionError),

    #[error("highlighting requested while a highlighting pass is already running")]
    /// `highlight_line`/`update_highlighting_state` was re-entered.
    Reentrant,

    #[error("highlighter used after it was disposed")]
    /// The highlighter was disposed.
    Disposed,

    #[error("begin_highlighting called while a highlighting group is already open")]
    /// Nested `begin_highlighting`.
    GroupAlreadyOpen,

    #[error("end_highlighting called without a matching begin_highlighting")]
    /// `end_highlighting` without an open group.
    GroupNotOpen,

    #[error("line {line} out of range (valid range is {first}..={last})")]
    /// A line number outside the highlighter's valid range.
    LineOutOfRange {
        /// The rejected line number.
        line: usize,
        /// Smallest valid line number.
        first: usize,
        /// Largest valid line number.
        last: usize,
    },

    #[error("range {start}..{end} is outside line bounds {line_start}..{line_end}")]
    /// A requested output range does not lie within the highlighted line.
    RangeOutOfLine {
        /// Requested start offset.
        start: usize,
        /// Requested end offset.
        end: usize,
        /// Offset of the line start.
        line_start: usize,
        /// Offset of the line end, excluding the delimiter.
        line_end: usize,
    },

    #[error("rich text writer failed")]
    /// The output sink rejected a write.
    Write(#[from] std::fmt::Error),

    #[error(transparent)]
    /// The document rejected a lookup.
    Document(#[from] DocumentError),
}

impl From<RopeError> for HighlightingError {
    fn from(error: RopeError) -> Self {
        HighlightingError::Document(DocumentError::Rope(error))
    }
}
