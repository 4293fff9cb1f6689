//! Incremental highlighting of a whole document.
//!
//! [`DocumentHighlighter`] remembers the [`SpanStack`] at the end of every line
//! and which of those stacks are still valid. Requests rescan forward from the
//! first invalid line only as far as needed. When the stack at the end of a
//! line changes, the next line's highlighting is stale and subscribers receive
//! a state-changed notification for it.
//!
//! Between [`begin_highlighting`](DocumentHighlighter::begin_highlighting) and
//! [`end_highlighting`](DocumentHighlighter::end_highlighting), highlighted
//! lines are kept so that repeated requests for the same line are answered
//! without rescanning.
//!
//! The highlighter follows document edits through [`LineTracker`]; feed it
//! every [`DocumentChange`](quill_core::DocumentChange) via
//! [`apply_to`](quill_core::DocumentChange::apply_to).

use std::sync::Arc;

use quill_core::{Document, LineTracker, Rope};
use tracing::{debug, trace};

use crate::color::HighlightingColor;
use crate::definition::HighlightingDefinition;
use crate::engine::{HighlightingEngine, SpanStack};
use crate::error::HighlightingError;
use crate::highlighted_line::HighlightedLine;
use crate::highlighter::Highlighter;

/// Callback for state-changed notifications: `(from_line, to_line)`, both inclusive.
pub type StateChangedCallback = Box<dyn FnMut(usize, usize) + Send>;

/// Cache state of the stack stored for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Never computed.
    Unknown,
    /// Matches the current text.
    Valid,
    /// Computed before the text at or above this line changed.
    Invalid,
}

/// Lazily highlights a document and keeps the result in step with its edits.
pub struct DocumentHighlighter {
    definition: Arc<HighlightingDefinition>,
    engine: HighlightingEngine,
    /// Index 0 holds the initial stack; index `n` the stack at the end of line `n`.
    stored_span_stacks: Rope<Option<SpanStack>>,
    is_valid: Rope<bool>,
    first_invalid_line: Option<usize>,
    initial_span_stack: SpanStack,
    line_count: usize,
    is_highlighting: bool,
    in_highlighting_group: bool,
    /// Lines highlighted during the open group.
    cached_lines: Option<Vec<HighlightedLine>>,
    disposed: bool,
    callbacks: Vec<StateChangedCallback>,
}

impl DocumentHighlighter {
    /// A highlighter for `document`, with every line invalid.
    pub fn new(document: &dyn Document, definition: Arc<HighlightingDefinition>) -> Self {
        let mut highlighter = Self {
            engine: HighlightingEngine::new(Arc::clone(&definition)),
            definition,
            stored_span_stacks: Rope::new(),
            is_valid: Rope::new(),
            first_invalid_line: Some(1),
            initial_span_stack: SpanStack::new(),
            line_count: document.line_count(),
            is_highlighting: false,
            in_highlighting_group: false,
            cached_lines: None,
            disposed: false,
            callbacks: Vec::new(),
        };
        highlighter.reset_span_stacks();
        highlighter
    }

    /// The definition in use.
    pub fn definition(&self) -> &Arc<HighlightingDefinition> {
        &self.definition
    }

    /// Number of lines the highlighter currently tracks.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Registers a callback for state-changed notifications.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(usize, usize) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Stack assumed at the start of line 1.
    pub fn initial_span_stack(&self) -> &SpanStack {
        &self.initial_span_stack
    }

    /// Changes the stack assumed at the start of line 1 and invalidates everything.
    pub fn set_initial_span_stack(&mut self, stack: SpanStack) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        self.initial_span_stack = stack;
        self.invalidate_highlighting()
    }

    /// Discards all cached state and notifies subscribers that every line changed.
    pub fn invalidate_highlighting(&mut self) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        self.reset_span_stacks();
        debug!(lines = self.line_count, "invalidated all highlighting state");
        self.notify(1, self.line_count);
        Ok(())
    }

    fn reset_span_stacks(&mut self) {
        self.clear_cached_lines();
        let mut stacks = vec![None; self.line_count + 1];
        stacks[0] = Some(self.initial_span_stack.clone());
        self.stored_span_stacks = Rope::from(stacks);
        let mut valid = vec![false; self.line_count + 1];
        valid[0] = true;
        self.is_valid = Rope::from(valid);
        self.first_invalid_line = (self.line_count > 0).then_some(1);
    }

    /// First line whose stored stack is stale, if any.
    pub fn first_invalid_line(&self) -> Option<usize> {
        self.first_invalid_line
    }

    /// Cache state of line `line_number` (0 is the initial state).
    pub fn line_state(&self, line_number: usize) -> Result<LineState, HighlightingError> {
        let stored = self.stored_span_stacks.get(line_number)?;
        Ok(match (stored, self.is_valid.get(line_number)?) {
            (None, _) => LineState::Unknown,
            (Some(_), true) => LineState::Valid,
            (Some(_), false) => LineState::Invalid,
        })
    }

    /// Spans open at the end of `line_number` (0 gives the initial stack),
    /// rescanning first if needed.
    pub fn get_span_stack(&mut self, document: &dyn Document, line_number: usize) -> Result<SpanStack, HighlightingError> {
        self.check_range(document, line_number, 0)?;
        if self.first_invalid_line.is_some_and(|first| first <= line_number) {
            self.update_highlighting_state(document, line_number)?;
        }
        Ok(self.stored_span_stacks.get(line_number)?.unwrap_or_default())
    }

    /// Span colors active at the end of `line_number`, innermost first.
    pub fn color_stack(
        &mut self,
        document: &dyn Document,
        line_number: usize,
    ) -> Result<Vec<Arc<HighlightingColor>>, HighlightingError> {
        let stack = self.get_span_stack(document, line_number)?;
        Ok(stack
            .iter()
            .filter_map(|&span| self.definition.span(span).span_color.clone())
            .collect())
    }

    /// Highlights line `line_number`, rescanning the lines above it as needed.
    pub fn highlight_line(
        &mut self,
        document: &dyn Document,
        line_number: usize,
    ) -> Result<HighlightedLine, HighlightingError> {
        self.check_range(document, line_number, 1)?;
        self.check_is_highlighting()?;
        let line = document.line_by_number(line_number)?;
        if let Some(cached) = self.cached_lines.as_ref().and_then(|cached| {
            cached.iter().find(|candidate| {
                candidate.line_number() == line_number
                    && candidate.offset() == line.offset
                    && candidate.length() == line.length
            })
        }) {
            return Ok(cached.clone());
        }
        let highlighted = self.run_pass(|this| {
            this.highlight_up_to(document, line_number - 1)?;
            let text = document.line_text(&line)?;
            let highlighted = this.engine.highlight_line(&line, &text)?;
            this.update_tree_list(line_number)?;
            Ok(highlighted)
        })?;
        if let Some(cached) = &mut self.cached_lines {
            cached.push(highlighted.clone());
        }
        Ok(highlighted)
    }

    /// Brings the stored stacks up to date through `line_number`.
    pub fn update_highlighting_state(&mut self, document: &dyn Document, line_number: usize) -> Result<(), HighlightingError> {
        self.check_range(document, line_number, 0)?;
        self.run_pass(|this| this.highlight_up_to(document, line_number))
    }

    /// Opens a batch of lookups.
    pub fn begin_highlighting(&mut self) -> Result<(), HighlightingError> {
        self.check_disposed()?;
        if self.in_highlighting_group {
            return Err(HighlightingError::GroupAlreadyOpen);
        }
        self.in_highlighting_group = true;
        self.cached_lines = Some(Vec::new());
        Ok(())
    }

    /// Closes the batch opened by [`begin_highlighting`](Self::begin_highlighting).
    pub fn end_highlighting(&mut self) -> Result<(), HighlightingError> {
        self.check_disposed()?;
        if !self.in_highlighting_group {
            return Err(HighlightingError::GroupNotOpen);
        }
        self.in_highlighting_group = false;
        self.cached_lines = None;
        Ok(())
    }

    /// Looks up a named color of the definition.
    pub fn named_color(&self, name: &str) -> Option<Arc<HighlightingColor>> {
        self.definition.named_color(name).cloned()
    }

    /// Releases the cached state. Every later request fails with
    /// [`HighlightingError::Disposed`].
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.callbacks.clear();
        self.cached_lines = None;
        self.stored_span_stacks.clear();
        self.is_valid.clear();
        self.first_invalid_line = None;
    }

    /// Returns `true` once [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Runs `pass` with the reentrancy guard held.
    ///
    /// A pass that panics leaves the guard held; the highlighter then rejects
    /// further requests with [`HighlightingError::Reentrant`].
    fn run_pass<R>(
        &mut self,
        pass: impl FnOnce(&mut Self) -> Result<R, HighlightingError>,
    ) -> Result<R, HighlightingError> {
        self.check_is_highlighting()?;
        self.is_highlighting = true;
        let result = pass(self);
        self.is_highlighting = false;
        result
    }

    fn highlight_up_to(&mut self, document: &dyn Document, target: usize) -> Result<(), HighlightingError> {
        let mut line_number = 0;
        while line_number <= target {
            let first = self.first_invalid_line.unwrap_or(usize::MAX);
            if first > line_number {
                if first <= target {
                    let stack = self.stored_span_stacks.get(first - 1)?.unwrap_or_default();
                    self.engine.set_current_span_stack(stack);
                    line_number = first;
                } else {
                    let stack = self.stored_span_stacks.get(target)?.unwrap_or_default();
                    self.engine.set_current_span_stack(stack);
                    return Ok(());
                }
            }
            let line = document.line_by_number(line_number)?;
            let text = document.line_text(&line)?;
            trace!(line = line_number, "rescanning line");
            self.engine.scan_line(&text)?;
            self.update_tree_list(line_number)?;
            line_number += 1;
        }
        Ok(())
    }

    fn update_tree_list(&mut self, line_number: usize) -> Result<(), HighlightingError> {
        let current = self.engine.current_span_stack().clone();
        let stored = self.stored_span_stacks.get(line_number)?;
        if stored.as_ref() != Some(&current) {
            self.is_valid.set(line_number, true)?;
            self.stored_span_stacks.set(line_number, Some(current))?;
            if line_number + 1 < self.is_valid.len() {
                self.is_valid.set(line_number + 1, false)?;
                self.first_invalid_line = Some(line_number + 1);
            } else {
                self.first_invalid_line = None;
            }
            if line_number < self.line_count {
                trace!(line = line_number + 1, "highlighting state changed");
                self.notify(line_number + 1, line_number + 1);
            }
        } else if self.first_invalid_line == Some(line_number) {
            self.is_valid.set(line_number, true)?;
            let remaining = self.is_valid.len() - line_number;
            self.first_invalid_line = self.is_valid.index_of(&false, line_number, remaining)?;
        }
        Ok(())
    }

    fn notify(&mut self, from_line: usize, to_line: usize) {
        for callback in &mut self.callbacks {
            callback(from_line, to_line);
        }
    }

    fn clear_cached_lines(&mut self) {
        if let Some(cached) = &mut self.cached_lines {
            cached.clear();
        }
    }

    fn mark_invalid(&mut self, line_number: usize) -> Result<(), HighlightingError> {
        self.clear_cached_lines();
        self.is_valid.set(line_number, false)?;
        self.first_invalid_line = Some(
            self.first_invalid_line
                .map_or(line_number, |first| first.min(line_number)),
        );
        Ok(())
    }

    fn check_range(&self, document: &dyn Document, line_number: usize, first: usize) -> Result<(), HighlightingError> {
        let last = document.line_count();
        if line_number < first || line_number > last {
            return Err(HighlightingError::LineOutOfRange {
                line: line_number,
                first,
                last,
            });
        }
        Ok(())
    }

    fn check_disposed(&self) -> Result<(), HighlightingError> {
        if self.disposed {
            return Err(HighlightingError::Disposed);
        }
        Ok(())
    }

    fn check_is_highlighting(&self) -> Result<(), HighlightingError> {
        self.check_disposed()?;
        if self.is_highlighting {
            return Err(HighlightingError::Reentrant);
        }
        Ok(())
    }
}

impl LineTracker for DocumentHighlighter {
    type Error = HighlightingError;

    fn before_remove_line(&mut self, line_number: usize) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        self.stored_span_stacks.remove_at(line_number)?;
        self.is_valid.remove_at(line_number)?;
        self.line_count = self.line_count.saturating_sub(1);
        if line_number < self.is_valid.len() {
            self.mark_invalid(line_number)?;
        }
        Ok(())
    }

    fn set_line_length(&mut self, line_number: usize, _new_total_length: usize) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        self.mark_invalid(line_number)
    }

    fn line_inserted(&mut self, insertion_pos: usize, new_line: usize) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        debug_assert_eq!(insertion_pos + 1, new_line);
        self.stored_span_stacks.insert(new_line, None)?;
        self.is_valid.insert(new_line, false)?;
        self.line_count += 1;
        self.mark_invalid(new_line)
    }

    fn rebuild_document(&mut self, line_count: usize) -> Result<(), HighlightingError> {
        self.check_is_highlighting()?;
        self.line_count = line_count;
        self.reset_span_stacks();
        debug!(lines = line_count, "rebuilt highlighting state");
        Ok(())
    }
}

impl Highlighter for DocumentHighlighter {
    fn highlight_line(&mut self, document: &dyn Document, line_number: usize) -> Result<HighlightedLine, HighlightingError> {
        DocumentHighlighter::highlight_line(self, document, line_number)
    }

    fn update_highlighting_state(&mut self, document: &dyn Document, line_number: usize) -> Result<(), HighlightingError> {
        DocumentHighlighter::update_highlighting_state(self, document, line_number)
    }

    fn begin_highlighting(&mut self) -> Result<(), HighlightingError> {
        DocumentHighlighter::begin_highlighting(self)
    }

    fn end_highlighting(&mut self) -> Result<(), HighlightingError> {
        DocumentHighlighter::end_highlighting(self)
    }

    fn named_color(&self, name: &str) -> Option<Arc<HighlightingColor>> {
        DocumentHighlighter::named_color(self, name)
    }
}

impl std::fmt::Debug for DocumentHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHighlighter")
            .field("definition", &self.definition.name())
            .field("line_count", &self.line_count)
            .field("first_invalid_line", &self.first_invalid_line)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::definition::{DefinitionBuilder, SpanBuilder};
    use parking_lot::Mutex;
    use quill_core::TextDocument;

    fn block_comments() -> Arc<HighlightingDefinition> {
        let mut builder = DefinitionBuilder::new("C");
        let main = builder.main_rule_set();
        let comment = builder.add_color("Comment", HighlightingColor::new().with_foreground(Rgba::rgb(0, 128, 0)));
        builder
            .add_span(main, SpanBuilder::new(r"/\*").end(r"\*/").span_color(comment))
            .unwrap();
        Arc::new(builder.build())
    }

    fn recorder(highlighter: &mut DocumentHighlighter) -> Arc<Mutex<Vec<(usize, usize)>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        highlighter.subscribe(move |from, to| sink.lock().push((from, to)));
        events
    }

    #[test]
    fn test_scans_only_as_far_as_requested() {
        let document = TextDocument::new("a\n/*\nb\nc */\nd");
        let mut highlighter = DocumentHighlighter::new(&document, block_comments());
        assert_eq!(highlighter.line_state(3).unwrap(), LineState::Unknown);

        highlighter.highlight_line(&document, 3).unwrap();
        assert_eq!(highlighter.line_state(2).unwrap(), LineState::Valid);
        assert_eq!(highlighter.line_state(3).unwrap(), LineState::Valid);
        assert_eq!(highlighter.line_state(4).unwrap(), LineState::Unknown);
        assert_eq!(highlighter.first_invalid_line(), Some(4));

        assert_eq!(highlighter.get_span_stack(&document, 5).unwrap().len(), 0);
        assert_eq!(highlighter.first_invalid_line(), None);
    }

    #[test]
    fn test_edit_invalidates_from_edited_line() {
        let mut document = TextDocument::new("x\n/*\ny\nz");
        let mut highlighter = DocumentHighlighter::new(&document, block_comments());
        highlighter.update_highlighting_state(&document, 4).unwrap();
        assert_eq!(highlighter.first_invalid_line(), None);
        let before = highlighter.get_span_stack(&document, 1).unwrap();

        let change = document.replace(2, 2, "").unwrap();
        change.apply_to(&mut highlighter).unwrap();
        assert_eq!(highlighter.line_state(1).unwrap(), LineState::Valid);
        assert_eq!(highlighter.line_state(2).unwrap(), LineState::Invalid);
        assert_eq!(highlighter.first_invalid_line(), Some(2));
        assert_eq!(highlighter.get_span_stack(&document, 1).unwrap(), before);
    }

    #[test]
    fn test_usage_errors() {
        let document = TextDocument::new("a\nb");
        let mut highlighter = DocumentHighlighter::new(&document, block_comments());

        assert!(matches!(
            highlighter.highlight_line(&document, 0),
            Err(HighlightingError::LineOutOfRange { line: 0, first: 1, last: 2 })
        ));
        assert!(matches!(
            highlighter.highlight_line(&document, 3),
            Err(HighlightingError::LineOutOfRange { line: 3, .. })
        ));
        assert_eq!(highlighter.end_highlighting(), Err(HighlightingError::GroupNotOpen));
        highlighter.begin_highlighting().unwrap();
        assert_eq!(highlighter.begin_highlighting(), Err(HighlightingError::GroupAlreadyOpen));
        highlighter.end_highlighting().unwrap();

        highlighter.dispose();
        assert!(highlighter.is_disposed());
        assert_eq!(
            highlighter.highlight_line(&document, 1).unwrap_err(),
            HighlightingError::Disposed
        );
        assert_eq!(highlighter.set_line_length(1, 2), Err(HighlightingError::Disposed));
    }

    struct CountingDocument {
        inner: TextDocument,
        reads: std::cell::Cell<usize>,
    }

    impl Document for CountingDocument {
        fn text_length(&self) -> usize {
            self.inner.text_length()
        }

        fn line_count(&self) -> usize {
            self.inner.line_count()
        }

        fn line_by_number(&self, line_number: usize) -> Result<quill_core::DocumentLine, quill_core::DocumentError> {
            self.inner.line_by_number(line_number)
        }

        fn text(&self, offset: usize, length: usize) -> Result<String, quill_core::DocumentError> {
            self.inner.text(offset, length)
        }

        fn line_text(&self, line: &quill_core::DocumentLine) -> Result<String, quill_core::DocumentError> {
            self.reads.set(self.reads.get() + 1);
            self.inner.line_text(line)
        }
    }

    #[test]
    fn test_group_reuses_highlighted_lines() {
        let document = CountingDocument {
            inner: TextDocument::new("/* a */ b\nc"),
            reads: std::cell::Cell::new(0),
        };
        let mut highlighter = DocumentHighlighter::new(&document, block_comments());

        highlighter.begin_highlighting().unwrap();
        let first = highlighter.highlight_line(&document, 1).unwrap();
        let reads = document.reads.get();
        let second = highlighter.highlight_line(&document, 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(document.reads.get(), reads);
        highlighter.end_highlighting().unwrap();

        highlighter.highlight_line(&document, 1).unwrap();
        assert!(document.reads.get() > reads);
    }

    #[test]
    fn test_invalidate_highlighting_notifies_every_line() {
        let document = TextDocument::new("a\nb\nc");
        let mut highlighter = DocumentHighlighter::new(&document, block_comments());
        highlighter.update_highlighting_state(&document, 3).unwrap();
        let events = recorder(&mut highlighter);

        highlighter.invalidate_highlighting().unwrap();
        assert_eq!(*events.lock(), vec![(1, 3)]);
        assert_eq!(highlighter.first_invalid_line(), Some(1));
        assert_eq!(highlighter.line_state(1).unwrap(), LineState::Unknown);
    }

    #[test]
    fn test_initial_span_stack_applies_to_first_line() {
        let definition = block_comments();
        let comment_span = definition.main_rule_set().spans()[0];
        let document = TextDocument::new("still comment */ code");
        let mut highlighter = DocumentHighlighter::new(&document, definition);
        highlighter
            .set_initial_span_stack(SpanStack::new().push(comment_span))
            .unwrap();

        let line = highlighter.highlight_line(&document, 1).unwrap();
        assert_eq!(line.sections().len(), 1);
        assert_eq!((line.sections()[0].offset, line.sections()[0].length), (0, 16));
        assert_eq!(highlighter.color_stack(&document, 0).unwrap().len(), 1);
        assert!(highlighter.color_stack(&document, 1).unwrap().is_empty());
    }
}
