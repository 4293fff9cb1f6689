//! Offset ranges within a document.

use std::ops::Range;

/// Anything that describes a contiguous range of a document.
///
/// Offsets and lengths are measured in chars.
pub trait Segment {
    /// Start offset.
    fn offset(&self) -> usize;

    /// Number of chars covered.
    fn length(&self) -> usize;

    /// Exclusive end offset.
    fn end_offset(&self) -> usize {
        self.offset() + self.length()
    }

    /// Returns `true` if `offset` lies in `[offset, end_offset)`.
    fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.offset() && offset < self.end_offset()
    }
}

/// A plain `(offset, length)` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SimpleSegment {
    /// Start offset.
    pub offset: usize,
    /// Number of chars covered.
    pub length: usize,
}

impl SimpleSegment {
    /// Creates a segment.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Returns the overlap of two segments, if any chars are shared.
    pub fn intersection(&self, other: &impl Segment) -> Option<SimpleSegment> {
        let start = self.offset.max(other.offset());
        let end = self.end_offset().min(other.end_offset());
        (start < end).then(|| SimpleSegment::new(start, end - start))
    }
}

impl Segment for SimpleSegment {
    fn offset(&self) -> usize {
        self.offset
    }

    fn length(&self) -> usize {
        self.length
    }
}

impl Segment for Range<usize> {
    fn offset(&self) -> usize {
        self.start
    }

    fn length(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

impl<S: Segment + ?Sized> Segment for &S {
    fn offset(&self) -> usize {
        (**self).offset()
    }

    fn length(&self) -> usize {
        (**self).length()
    }
}

impl From<Range<usize>> for SimpleSegment {
    fn from(range: Range<usize>) -> Self {
        SimpleSegment::new(range.start, range.length())
    }
}
