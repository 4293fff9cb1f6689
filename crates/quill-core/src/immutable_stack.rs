//! Persistent singly linked stack.
//!
//! Every `push`/`pop` returns a new stack that shares its tail with the
//! original, so snapshotting a stack is a reference-count bump. Equality is
//! structural: two stacks are equal when their elements compare equal pairwise
//! down to a shared tail (or both run out).

use std::fmt;
use std::sync::Arc;

struct Frame<T> {
    value: T,
    next: ImmutableStack<T>,
}

/// An immutable stack with structural sharing of tails.
pub struct ImmutableStack<T> {
    head: Option<Arc<Frame<T>>>,
}

impl<T> ImmutableStack<T> {
    /// Creates an empty stack.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Returns `true` if the stack has no elements.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns a new stack with `value` on top; `self` is unchanged.
    pub fn push(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Frame {
                value,
                next: self.clone(),
            })),
        }
    }

    /// Returns the top element.
    pub fn peek(&self) -> Option<&T> {
        self.head.as_ref().map(|frame| &frame.value)
    }

    /// Returns the stack without its top element, or `None` when empty.
    pub fn pop(&self) -> Option<Self> {
        self.head.as_ref().map(|frame| frame.next.clone())
    }

    /// Splits the stack into its top element and the remaining stack.
    pub fn split(&self) -> Option<(&T, Self)> {
        self.head
            .as_ref()
            .map(|frame| (&frame.value, frame.next.clone()))
    }

    /// Number of elements (walks the list).
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterates from the top (innermost) element to the bottom.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    /// Returns `true` if both stacks are the same snapshot (same head allocation).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> Clone for ImmutableStack<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
        }
    }
}

impl<T> Default for ImmutableStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for ImmutableStack<T> {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (&a.head, &b.head) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.value != y.value {
                        return false;
                    }
                    a = &x.next;
                    b = &y.next;
                }
                _ => return false,
            }
        }
    }
}

impl<T: Eq> Eq for ImmutableStack<T> {}

impl<T: fmt::Debug> fmt::Debug for ImmutableStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> FromIterator<T> for ImmutableStack<T> {
    /// Pushes the items in order, so the last item ends up on top.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |stack, value| stack.push(value))
    }
}

impl<T> Drop for ImmutableStack<T> {
    fn drop(&mut self) {
        // Unlink uniquely owned frames iteratively so long stacks don't recurse.
        let mut head = self.head.take();
        while let Some(frame) = head {
            match Arc::try_unwrap(frame) {
                Ok(mut frame) => head = frame.next.head.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator over an [`ImmutableStack`], top first.
pub struct Iter<'a, T> {
    next: Option<&'a Frame<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.next.head.as_deref();
        Some(&frame.value)
    }
}

impl<'a, T> IntoIterator for &'a ImmutableStack<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
