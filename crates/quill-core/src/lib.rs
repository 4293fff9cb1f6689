#![warn(missing_docs)]
//! Quill Core - storage primitives for a headless editor
//!
//! # Overview
//!
//! `quill-core` provides the data structures the rest of the quill stack is
//! built on:
//!
//! - **Persistent rope**: [`Rope<T>`], an AVL tree of fixed-capacity leaves with
//!   O(log n) indexed edits, O(1) cloning through structural sharing, and lazily
//!   evaluated function nodes
//! - **Immutable stacks**: [`ImmutableStack<T>`], a cons list with shared tails
//!   and structural equality, used for cheap per-line state snapshots
//! - **Documents**: the [`Document`] line-provider trait and a rope-backed
//!   [`TextDocument`] that reports its edits as [`DocumentChange`]s
//! - **Line tracking**: the [`LineTracker`] interface through which per-line
//!   caches follow document edits
//!
//! # Quick Start
//!
//! ```rust
//! use quill_core::{Document, Rope, TextDocument};
//!
//! let mut rope = Rope::from("hello");
//! let snapshot = rope.clone();
//! rope.insert_str(5, " world").unwrap();
//! assert_eq!(rope.to_string(), "hello world");
//! assert_eq!(snapshot.to_string(), "hello");
//!
//! let mut doc = TextDocument::new("fn main() {\n}\n");
//! let change = doc.insert(11, " body();\n").unwrap();
//! assert_eq!(doc.line_count(), 4);
//! assert!(!change.line_changes.is_empty());
//! ```
//!
//! # Module Description
//!
//! - [`rope`] - persistent rope and its text helpers
//! - [`immutable_stack`] - persistent linked stack
//! - [`document`] - document trait and rope-backed document
//! - [`line_tracker`] - line change events and the tracker interface
//! - [`segment`] - offset range abstraction

pub mod document;
pub mod immutable_stack;
pub mod line_tracker;
pub mod rope;
pub mod segment;

pub use document::{Document, DocumentError, DocumentLine, LineDelimiter, TextDocument};
pub use immutable_stack::ImmutableStack;
pub use line_tracker::{DocumentChange, LineChange, LineTracker};
pub use rope::{Rope, RopeError};
pub use segment::{Segment, SimpleSegment};
