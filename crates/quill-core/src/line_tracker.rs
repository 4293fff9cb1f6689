//! Line-level change notifications.
//!
//! A document describes every edit as a [`DocumentChange`]: the sequence of
//! line-table updates it performed. Anything that keeps per-line state in step
//! with the document implements [`LineTracker`] and receives those updates in
//! order, using 1-based line numbers that are valid at the moment each call is
//! made.

/// One line-table update, in the order the document applied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    /// Line `line_number` is about to be removed; later lines move up by one.
    BeforeRemove {
        /// Line being removed.
        line_number: usize,
    },
    /// The text of `line_number` changed; it now spans `new_total_length`
    /// chars including its delimiter.
    SetLength {
        /// Line whose text changed.
        line_number: usize,
        /// New length including the delimiter.
        new_total_length: usize,
    },
    /// A new line was inserted as `new_line`, directly after `insertion_pos`.
    Inserted {
        /// Existing line preceding the new one.
        insertion_pos: usize,
        /// Number of the inserted line.
        new_line: usize,
        /// Length of the new line including its delimiter.
        new_total_length: usize,
    },
    /// The whole line table was rebuilt; it now has `line_count` lines.
    Rebuilt {
        /// New number of lines.
        line_count: usize,
    },
}

/// One text edit and the line-table updates it caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    /// Char offset of the edit.
    pub offset: usize,
    /// Number of chars removed at `offset`.
    pub removed_length: usize,
    /// Number of chars inserted at `offset`.
    pub inserted_length: usize,
    /// Line-table updates, in application order.
    pub line_changes: Vec<LineChange>,
}

impl DocumentChange {
    /// Replays the line changes onto `tracker`, then calls
    /// [`LineTracker::change_complete`].
    pub fn apply_to<L>(&self, tracker: &mut L) -> Result<(), L::Error>
    where
        L: LineTracker + ?Sized,
    {
        for change in &self.line_changes {
            match *change {
                LineChange::BeforeRemove { line_number } => tracker.before_remove_line(line_number)?,
                LineChange::SetLength {
                    line_number,
                    new_total_length,
                } => tracker.set_line_length(line_number, new_total_length)?,
                LineChange::Inserted {
                    insertion_pos,
                    new_line,
                    ..
                } => tracker.line_inserted(insertion_pos, new_line)?,
                LineChange::Rebuilt { line_count } => tracker.rebuild_document(line_count)?,
            }
        }
        tracker.change_complete(self)
    }
}

/// Receives line-table updates from a document.
pub trait LineTracker {
    /// Error returned when an update cannot be applied.
    type Error;

    /// Line `line_number` is about to be removed.
    fn before_remove_line(&mut self, line_number: usize) -> Result<(), Self::Error>;

    /// The text of `line_number` changed.
    fn set_line_length(&mut self, line_number: usize, new_total_length: usize) -> Result<(), Self::Error>;

    /// `new_line` was inserted after `insertion_pos`.
    fn line_inserted(&mut self, insertion_pos: usize, new_line: usize) -> Result<(), Self::Error>;

    /// The document was replaced wholesale and now has `line_count` lines.
    fn rebuild_document(&mut self, line_count: usize) -> Result<(), Self::Error>;

    /// Called once after all line changes of an edit were delivered.
    fn change_complete(&mut self, _change: &DocumentChange) -> Result<(), Self::Error> {
        Ok(())
    }
}
