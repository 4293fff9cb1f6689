//! Line-oriented document access.
//!
//! [`Document`] is the read-only view consumers (such as highlighters) need:
//! a line count, line lookup by 1-based number, and text retrieval.
//! [`TextDocument`] is a rope-backed implementation that also performs edits
//! and reports the resulting line-table updates as a [`DocumentChange`].

use std::fmt;

use thiserror::Error;

use crate::line_tracker::{DocumentChange, LineChange};
use crate::rope::{Rope, RopeError};
use crate::segment::Segment;

/// Errors returned by [`Document`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("line {line} out of range (valid range is 1..={line_count})")]
    /// Line number outside `1..=line_count`.
    LineOutOfRange {
        /// The rejected line number.
        line: usize,
        /// Current number of lines.
        line_count: usize,
    },
    #[error("range {offset}+{length} out of bounds for document of length {text_length}")]
    /// A char range extending past the end of the document.
    OffsetOutOfRange {
        /// Start of the rejected range.
        offset: usize,
        /// Length of the rejected range.
        length: usize,
        /// Current document length.
        text_length: usize,
    },
    #[error(transparent)]
    /// Error from the underlying rope.
    Rope(#[from] RopeError),
}

/// The delimiter terminating a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineDelimiter {
    /// Last line of the document.
    #[default]
    None,
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
}

impl LineDelimiter {
    /// Length of the delimiter in chars.
    pub fn len(self) -> usize {
        match self {
            LineDelimiter::None => 0,
            LineDelimiter::Lf | LineDelimiter::Cr => 1,
            LineDelimiter::CrLf => 2,
        }
    }

    /// Returns `true` for [`LineDelimiter::None`].
    pub fn is_empty(self) -> bool {
        self == LineDelimiter::None
    }
}

/// A snapshot of one line's position within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentLine {
    /// 1-based line number.
    pub line_number: usize,
    /// Char offset of the first char of the line.
    pub offset: usize,
    /// Length of the line text, excluding the delimiter.
    pub length: usize,
    /// The delimiter terminating this line.
    pub delimiter: LineDelimiter,
}

impl DocumentLine {
    /// Length including the delimiter.
    pub fn total_length(&self) -> usize {
        self.length + self.delimiter.len()
    }
}

impl Segment for DocumentLine {
    fn offset(&self) -> usize {
        self.offset
    }

    fn length(&self) -> usize {
        self.length
    }
}

/// Read access to a line-structured document.
pub trait Document {
    /// Total number of chars.
    fn text_length(&self) -> usize;

    /// Number of lines; always at least 1.
    fn line_count(&self) -> usize;

    /// Looks up a line by its 1-based number.
    fn line_by_number(&self, line_number: usize) -> Result<DocumentLine, DocumentError>;

    /// Returns `length` chars starting at `offset`.
    fn text(&self, offset: usize, length: usize) -> Result<String, DocumentError>;

    /// Returns the text of `line`, without its delimiter.
    fn line_text(&self, line: &DocumentLine) -> Result<String, DocumentError> {
        self.text(line.offset, line.length)
    }
}

#[derive(Debug, Clone, Copy)]
struct LineRecord {
    offset: usize,
    length: usize,
    delimiter: LineDelimiter,
}

impl LineRecord {
    fn total_length(&self) -> usize {
        self.length + self.delimiter.len()
    }
}

/// Splits `text` into `(length, delimiter)` pairs; always yields at least one line.
fn split_lines(text: &[char]) -> Vec<(usize, LineDelimiter)> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            '\n' => {
                lines.push((i - start, LineDelimiter::Lf));
                i += 1;
                start = i;
            }
            '\r' if text.get(i + 1) == Some(&'\n') => {
                lines.push((i - start, LineDelimiter::CrLf));
                i += 2;
                start = i;
            }
            '\r' => {
                lines.push((i - start, LineDelimiter::Cr));
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    lines.push((text.len() - start, LineDelimiter::None));
    lines
}

fn layout(lines: Vec<(usize, LineDelimiter)>, mut offset: usize) -> Vec<LineRecord> {
    lines
        .into_iter()
        .map(|(length, delimiter)| {
            let record = LineRecord {
                offset,
                length,
                delimiter,
            };
            offset += record.total_length();
            record
        })
        .collect()
}

/// A rope-backed, editable document.
#[derive(Clone)]
pub struct TextDocument {
    text: Rope<char>,
    lines: Vec<LineRecord>,
}

impl TextDocument {
    /// Creates a document holding `text`.
    pub fn new(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self {
            lines: layout(split_lines(&chars), 0),
            text: Rope::from_slice(&chars),
        }
    }

    /// The document text.
    pub fn rope(&self) -> &Rope<char> {
        &self.text
    }

    /// Returns the 1-based number of the line containing `offset`.
    ///
    /// An offset at the very end of the document belongs to the last line.
    pub fn line_number_at(&self, offset: usize) -> Result<usize, DocumentError> {
        if offset > self.text.len() {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                length: 0,
                text_length: self.text.len(),
            });
        }
        Ok(self.line_index_at(offset) + 1)
    }

    fn line_index_at(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|line| line.offset <= offset)
            .saturating_sub(1)
    }

    /// Inserts `text` at `offset`.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<DocumentChange, DocumentError> {
        self.replace(offset, 0, text)
    }

    /// Removes `length` chars at `offset`.
    pub fn remove(&mut self, offset: usize, length: usize) -> Result<DocumentChange, DocumentError> {
        self.replace(offset, length, "")
    }

    /// Replaces `length` chars at `offset` with `text`.
    ///
    /// The returned change lists the line-table updates in the order they were
    /// applied: removals of swallowed lines, the length change of the first
    /// affected line, then insertions of new lines.
    pub fn replace(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<DocumentChange, DocumentError> {
        let text_length = self.text.len();
        let end = match offset.checked_add(length) {
            Some(end) if end <= text_length => end,
            _ => {
                return Err(DocumentError::OffsetOutOfRange {
                    offset,
                    length,
                    text_length,
                });
            }
        };
        let inserted: Vec<char> = text.chars().collect();

        // A lone '\r' ending the previous line can only pair with a '\n' the
        // edit brings to the start of a line. An edit reaching a lone '\r'
        // delimiter also rewrites the start of the following line.
        let mut first = self.line_index_at(offset);
        if first > 0
            && offset == self.lines[first].offset
            && self.lines[first - 1].delimiter == LineDelimiter::Cr
        {
            first -= 1;
        }
        let mut last = self.line_index_at(end);
        let last_line = self.lines[last];
        if last + 1 < self.lines.len()
            && last_line.delimiter == LineDelimiter::Cr
            && end >= last_line.offset + last_line.length
        {
            last += 1;
        }

        let region_start = self.lines[first].offset;
        let region_end = self.lines[last].offset + self.lines[last].total_length();
        let mut region = Vec::with_capacity(region_end - region_start - length + inserted.len());
        self.text.copy_to(region_start, offset - region_start, &mut region)?;
        region.extend_from_slice(&inserted);
        self.text.copy_to(end, region_end - end, &mut region)?;

        let mut new_lines = split_lines(&region);
        if last + 1 < self.lines.len() {
            // The region ends with a delimiter; the empty remainder is the next line.
            new_lines.pop();
        }

        let first_number = first + 1;
        let removed_lines = last - first;
        let mut line_changes = Vec::with_capacity(removed_lines + new_lines.len());
        for _ in 0..removed_lines {
            line_changes.push(LineChange::BeforeRemove {
                line_number: first_number + 1,
            });
        }
        for (i, (line_length, delimiter)) in new_lines.iter().enumerate() {
            let new_total_length = line_length + delimiter.len();
            if i == 0 {
                line_changes.push(LineChange::SetLength {
                    line_number: first_number,
                    new_total_length,
                });
            } else {
                line_changes.push(LineChange::Inserted {
                    insertion_pos: first_number + i - 1,
                    new_line: first_number + i,
                    new_total_length,
                });
            }
        }

        self.text.remove_range(offset, length)?;
        self.text.insert_slice(offset, &inserted)?;

        let added = new_lines.len();
        self.lines
            .splice(first..=last, layout(new_lines, region_start));
        for line in &mut self.lines[first + added..] {
            line.offset = line.offset - length + inserted.len();
        }

        tracing::trace!(
            offset,
            removed = length,
            inserted = inserted.len(),
            line_changes = line_changes.len(),
            "document.replace"
        );

        Ok(DocumentChange {
            offset,
            removed_length: length,
            inserted_length: inserted.len(),
            line_changes,
        })
    }

    /// Replaces the whole text.
    pub fn set_text(&mut self, text: &str) -> DocumentChange {
        let removed_length = self.text.len();
        *self = Self::new(text);
        tracing::trace!(line_count = self.lines.len(), "document.set_text");
        DocumentChange {
            offset: 0,
            removed_length,
            inserted_length: self.text.len(),
            line_changes: vec![LineChange::Rebuilt {
                line_count: self.lines.len(),
            }],
        }
    }
}

impl Document for TextDocument {
    fn text_length(&self) -> usize {
        self.text.len()
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_by_number(&self, line_number: usize) -> Result<DocumentLine, DocumentError> {
        let record = line_number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .ok_or(DocumentError::LineOutOfRange {
                line: line_number,
                line_count: self.lines.len(),
            })?;
        Ok(DocumentLine {
            line_number,
            offset: record.offset,
            length: record.length,
            delimiter: record.delimiter,
        })
    }

    fn text(&self, offset: usize, length: usize) -> Result<String, DocumentError> {
        self.text.substring(offset, length).map_err(|_| DocumentError::OffsetOutOfRange {
            offset,
            length,
            text_length: self.text.len(),
        })
    }
}

impl Default for TextDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Display for TextDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.text, f)
    }
}

impl fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDocument")
            .field("text_length", &self.text.len())
            .field("line_count", &self.lines.len())
            .finish()
    }
}
