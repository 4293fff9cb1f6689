//! Persistent rope.
//!
//! [`Rope<T>`] is a balanced (AVL) tree of fixed-capacity leaves. Cloning a rope
//! is O(1): both copies share every node, and the first write to a shared node
//! copies just the path from the root to the touched leaf.
//!
//! Lookups go through a small positional cache (the path to the last leaf
//! visited), so sequential access by index is amortized O(1). The cache is an
//! immutable stack swapped in atomically; concurrent readers of the same rope
//! race only on which path ends up cached.

mod chars;
pub(crate) mod node;

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thiserror::Error;

use self::node::{FunctionNode, NodeRef, RopeNode};
use crate::ImmutableStack;

/// Errors returned by [`Rope`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RopeError {
    #[error("index {index} out of range (valid range is 0..{len})")]
    /// Element index outside `0..len`.
    IndexOutOfRange {
        /// The rejected index.
        index: usize,
        /// Current rope length.
        len: usize,
    },
    #[error("insertion index {index} out of range (valid range is 0..={len})")]
    /// Insertion position outside `0..=len`.
    InsertOutOfRange {
        /// The rejected position.
        index: usize,
        /// Current rope length.
        len: usize,
    },
    #[error("range {index}+{count} out of bounds for rope of length {len}")]
    /// A `(index, count)` range extending past the end.
    RangeOutOfBounds {
        /// Start of the rejected range.
        index: usize,
        /// Length of the rejected range.
        count: usize,
        /// Current rope length.
        len: usize,
    },
}

struct CacheEntry<T> {
    node: NodeRef<T>,
    start: usize,
}

impl<T> CacheEntry<T> {
    fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.start + self.node.len()
    }

    fn leaf(&self) -> &[T] {
        match &*self.node {
            RopeNode::Leaf(items) => items,
            _ => {
                debug_assert!(false, "cache lookup must end at a leaf");
                &[]
            }
        }
    }
}

type CacheStack<T> = ImmutableStack<CacheEntry<T>>;

/// A persistent sequence with O(log n) indexed edits and O(1) cloning.
pub struct Rope<T> {
    pub(crate) root: NodeRef<T>,
    cache: ArcSwapOption<CacheStack<T>>,
}

impl<T: Clone> Rope<T> {
    /// Creates an empty rope.
    pub fn new() -> Self {
        Self::from_root(node::empty_leaf())
    }

    fn from_root(root: NodeRef<T>) -> Self {
        Self {
            root,
            cache: ArcSwapOption::empty(),
        }
    }

    /// Creates a rope holding a copy of `items`.
    pub fn from_slice(items: &[T]) -> Self {
        Self::from_root(node::from_slice(items))
    }

    /// Creates a rope of `length` elements whose content is produced by
    /// `initializer` the first time any element is accessed.
    ///
    /// The initializer runs at most once, even when the rope is cloned.
    ///
    /// # Panics
    ///
    /// Accessing the content panics if the initializer returns a rope of a
    /// different length, or if it (directly or indirectly) accesses the rope it
    /// is initializing.
    pub fn from_fn<F>(length: usize, initializer: F) -> Self
    where
        F: FnOnce() -> Rope<T> + Send + 'static,
    {
        if length == 0 {
            return Self::new();
        }
        Self::from_root(Arc::new(RopeNode::Function(FunctionNode::new(
            length,
            Box::new(initializer),
        ))))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Returns `true` if the rope has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the element at `index`.
    pub fn get(&self, index: usize) -> Result<T, RopeError> {
        self.verify_index(index)?;
        let path = self.find_leaf(index);
        let entry = path.peek().map(|entry| entry.leaf()[index - entry.start].clone());
        entry.ok_or(RopeError::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    /// Replaces the element at `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), RopeError> {
        self.verify_index(index)?;
        self.invalidate_cache();
        node::set_element(&mut self.root, index, value);
        Ok(())
    }

    /// Inserts `item` at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), RopeError> {
        self.insert_slice(index, std::slice::from_ref(&item))
    }

    /// Inserts a copy of `items` at `index`.
    pub fn insert_slice(&mut self, index: usize, items: &[T]) -> Result<(), RopeError> {
        self.verify_insert(index)?;
        if items.is_empty() {
            return Ok(());
        }
        self.invalidate_cache();
        node::insert_items(&mut self.root, index, items);
        Ok(())
    }

    /// Inserts the content of `other` at `index`, sharing its nodes.
    pub fn insert_rope(&mut self, index: usize, other: &Rope<T>) -> Result<(), RopeError> {
        self.verify_insert(index)?;
        if other.is_empty() {
            return Ok(());
        }
        self.invalidate_cache();
        node::insert_node(&mut self.root, index, other.root.clone());
        Ok(())
    }

    /// Appends one element.
    pub fn push(&mut self, item: T) {
        self.extend_from_slice(std::slice::from_ref(&item));
    }

    /// Appends a copy of `items`.
    pub fn extend_from_slice(&mut self, items: &[T]) {
        if items.is_empty() {
            return;
        }
        self.invalidate_cache();
        let len = self.len();
        node::insert_items(&mut self.root, len, items);
    }

    /// Appends the content of `other`, sharing its nodes.
    pub fn append(&mut self, other: &Rope<T>) {
        self.invalidate_cache();
        self.root = node::concat(self.root.clone(), other.root.clone());
    }

    /// Removes and returns the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, RopeError> {
        let removed = self.get(index)?;
        self.remove_range(index, 1)?;
        Ok(removed)
    }

    /// Removes `count` elements starting at `index`.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<(), RopeError> {
        self.verify_range(index, count)?;
        if count == 0 {
            return Ok(());
        }
        self.invalidate_cache();
        node::remove_range(&mut self.root, index, count);
        Ok(())
    }

    /// Overwrites `items.len()` elements starting at `index`.
    pub fn set_range(&mut self, index: usize, items: &[T]) -> Result<(), RopeError> {
        self.verify_range(index, items.len())?;
        self.invalidate_cache();
        node::store_elements(&mut self.root, index, items);
        Ok(())
    }

    /// Returns a new rope with `count` elements starting at `index`.
    pub fn get_range(&self, index: usize, count: usize) -> Result<Rope<T>, RopeError> {
        self.verify_range(index, count)?;
        let mut range = self.clone();
        let end = index + count;
        range.remove_range(end, range.len() - end)?;
        range.remove_range(0, index)?;
        Ok(range)
    }

    /// Concatenates two ropes; both inputs stay usable and share nodes with the result.
    pub fn concat(left: &Rope<T>, right: &Rope<T>) -> Rope<T> {
        Self::from_root(node::concat(left.root.clone(), right.root.clone()))
    }

    /// Concatenates any number of ropes.
    pub fn concat_all<'a, I>(ropes: I) -> Rope<T>
    where
        I: IntoIterator<Item = &'a Rope<T>>,
        T: 'a,
    {
        let root = ropes
            .into_iter()
            .fold(node::empty_leaf(), |acc, rope| node::concat(acc, rope.root.clone()));
        Self::from_root(root)
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.invalidate_cache();
        self.root = node::empty_leaf();
    }

    /// Index of the first occurrence of `item` within `[start, start + count)`.
    pub fn index_of(&self, item: &T, start: usize, count: usize) -> Result<Option<usize>, RopeError>
    where
        T: PartialEq,
    {
        self.verify_range(start, count)?;
        let end = start + count;
        let mut position = start;
        while position < end {
            let path = self.find_leaf(position);
            let Some(entry) = path.peek() else { break };
            let leaf = entry.leaf();
            let leaf_end = (entry.start + leaf.len()).min(end);
            let hit = leaf[position - entry.start..leaf_end - entry.start]
                .iter()
                .position(|candidate| candidate == item);
            if let Some(offset) = hit {
                return Ok(Some(position + offset));
            }
            position = leaf_end;
        }
        Ok(None)
    }

    /// Index of the last occurrence of `item` within `[start, start + count)`.
    pub fn last_index_of(
        &self,
        item: &T,
        start: usize,
        count: usize,
    ) -> Result<Option<usize>, RopeError>
    where
        T: PartialEq,
    {
        self.verify_range(start, count)?;
        let mut end = start + count;
        while end > start {
            let path = self.find_leaf(end - 1);
            let Some(entry) = path.peek() else { break };
            let leaf = entry.leaf();
            let leaf_start = entry.start.max(start);
            let hit = leaf[leaf_start - entry.start..end - entry.start]
                .iter()
                .rposition(|candidate| candidate == item);
            if let Some(offset) = hit {
                return Ok(Some(leaf_start + offset));
            }
            end = leaf_start;
        }
        Ok(None)
    }

    /// Returns `true` if the rope contains `item`.
    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        matches!(self.index_of(item, 0, self.len()), Ok(Some(_)))
    }

    /// Appends `count` elements starting at `index` to `out`.
    pub fn copy_to(&self, index: usize, count: usize, out: &mut Vec<T>) -> Result<(), RopeError> {
        self.verify_range(index, count)?;
        node::copy_to(&self.root, index, count, out);
        Ok(())
    }

    /// Copies the whole rope into a vector.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        node::copy_to(&self.root, 0, self.len(), &mut out);
        out
    }

    /// Copies `count` elements starting at `index` into a vector.
    pub fn to_vec_range(&self, index: usize, count: usize) -> Result<Vec<T>, RopeError> {
        let mut out = Vec::with_capacity(count);
        self.copy_to(index, count, &mut out)?;
        Ok(out)
    }

    /// Iterates over copies of the elements in order.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            pending: vec![self.root.clone()],
            leaf: None,
            position: 0,
            remaining: self.len(),
        }
    }

    /// Panics if any tree invariant is violated.
    ///
    /// Checks leaf capacity, concat length and height bookkeeping, AVL balance,
    /// and that no concat node is small enough to be a single leaf.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        node::check_invariants(&self.root);
    }

    fn invalidate_cache(&mut self) {
        // Drop cached paths first so the write path can reuse uniquely owned nodes.
        self.cache.store(None);
    }

    /// Returns the root-to-leaf path for `index`, starting from the cached path.
    fn find_leaf(&self, index: usize) -> Arc<CacheStack<T>> {
        debug_assert!(index < self.len());
        let cached = self.cache.load_full();
        let mut stack = match &cached {
            Some(stack) => (**stack).clone(),
            None => CacheStack::new().push(CacheEntry {
                node: self.root.clone(),
                start: 0,
            }),
        };

        while let Some((entry, rest)) = stack.split() {
            if entry.contains(index) || rest.is_empty() {
                break;
            }
            stack = rest;
        }

        loop {
            let Some((entry, rest)) = stack.split() else {
                break;
            };
            let (node, start) = (entry.node.clone(), entry.start);
            match &*node {
                RopeNode::Leaf(_) => break,
                RopeNode::Function(function) => {
                    stack = rest.push(CacheEntry {
                        node: function.content(),
                        start,
                    });
                }
                RopeNode::Concat(c) => {
                    let left_len = c.left.len();
                    stack = if index - start >= left_len {
                        stack.push(CacheEntry {
                            node: c.right.clone(),
                            start: start + left_len,
                        })
                    } else {
                        stack.push(CacheEntry {
                            node: c.left.clone(),
                            start,
                        })
                    };
                }
            }
        }

        if let Some(cached) = cached
            && cached.ptr_eq(&stack)
        {
            return cached;
        }
        let stack = Arc::new(stack);
        self.cache.store(Some(stack.clone()));
        stack
    }

    fn verify_index(&self, index: usize) -> Result<(), RopeError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(RopeError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    fn verify_insert(&self, index: usize) -> Result<(), RopeError> {
        if index <= self.len() {
            Ok(())
        } else {
            Err(RopeError::InsertOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    fn verify_range(&self, index: usize, count: usize) -> Result<(), RopeError> {
        match index.checked_add(count) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(RopeError::RangeOutOfBounds {
                index,
                count,
                len: self.len(),
            }),
        }
    }
}

impl<T> Clone for Rope<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            cache: ArcSwapOption::empty(),
        }
    }
}

impl<T: Clone> Default for Rope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> From<&[T]> for Rope<T> {
    fn from(items: &[T]) -> Self {
        Self::from_slice(items)
    }
}

impl<T: Clone> From<Vec<T>> for Rope<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_slice(&items)
    }
}

impl<T: Clone> FromIterator<T> for Rope<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        Self::from_slice(&items)
    }
}

impl<T: Clone + PartialEq> PartialEq for Rope<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.root, &other.root) {
            return true;
        }
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Clone + Eq> Eq for Rope<T> {}

impl<T: Clone + fmt::Debug> fmt::Debug for Rope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Clone> IntoIterator for &Rope<T> {
    type Item = T;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`Rope`], yielding cloned elements.
///
/// Holds its own references to the tree, so the rope can be mutated (through
/// another handle) while iterating without affecting the iteration.
pub struct Iter<T> {
    pending: Vec<NodeRef<T>>,
    leaf: Option<NodeRef<T>>,
    position: usize,
    remaining: usize,
}

impl<T: Clone> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if let Some(leaf) = &self.leaf
                && let RopeNode::Leaf(items) = &**leaf
                && let Some(item) = items.get(self.position)
            {
                self.position += 1;
                self.remaining -= 1;
                return Some(item.clone());
            }
            let node = self.pending.pop()?;
            match &*node {
                RopeNode::Leaf(_) => {
                    self.leaf = Some(node);
                    self.position = 0;
                }
                RopeNode::Concat(c) => {
                    self.pending.push(c.right.clone());
                    self.pending.push(c.left.clone());
                }
                RopeNode::Function(function) => self.pending.push(function.content()),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Clone> ExactSizeIterator for Iter<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_hello_world() {
        let mut rope: Rope<char> = Rope::new();
        rope.insert_str(0, "hello").unwrap();
        rope.insert_str(5, " world").unwrap();
        assert_eq!(rope.to_string(), "hello world");
    }

    #[test]
    fn test_get_and_set_across_leaves() {
        let data: Vec<u32> = (0..2_000).collect();
        let mut rope = Rope::from_slice(&data);
        assert_eq!(rope.get(0), Ok(0));
        assert_eq!(rope.get(1_999), Ok(1_999));
        rope.set(700, 7).unwrap();
        assert_eq!(rope.get(700), Ok(7));
        assert_eq!(
            rope.get(2_000),
            Err(RopeError::IndexOutOfRange {
                index: 2_000,
                len: 2_000
            })
        );
        rope.assert_invariants();
    }

    #[test]
    fn test_sequential_reads_reuse_cache() {
        let data: Vec<u32> = (0..5_000).collect();
        let rope = Rope::from_slice(&data);
        for (i, expected) in data.iter().enumerate() {
            assert_eq!(rope.get(i).unwrap(), *expected);
        }
        for i in (0..5_000).rev().step_by(37) {
            assert_eq!(rope.get(i).unwrap(), data[i]);
        }
    }

    #[test]
    fn test_clone_isolation() {
        let mut original = Rope::from_slice(&[1, 2, 3, 4]);
        let snapshot = original.clone();
        original.insert(2, 99).unwrap();
        original.set(0, 10).unwrap();
        assert_eq!(original.to_vec(), vec![10, 2, 99, 3, 4]);
        assert_eq!(snapshot.to_vec(), vec![1, 2, 3, 4]);

        let mut copy = snapshot.clone();
        copy.remove_range(0, 2).unwrap();
        assert_eq!(copy.to_vec(), vec![3, 4]);
        assert_eq!(snapshot.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_remove_at_returns_element() {
        let mut rope = Rope::from_slice(&['a', 'b', 'c']);
        assert_eq!(rope.remove_at(1), Ok('b'));
        assert_eq!(rope.to_vec(), vec!['a', 'c']);
        assert!(rope.remove_at(2).is_err());
    }

    #[test]
    fn test_range_errors_report_bounds() {
        let mut rope = Rope::from_slice(&[1, 2, 3]);
        assert_eq!(
            rope.remove_range(2, 5),
            Err(RopeError::RangeOutOfBounds {
                index: 2,
                count: 5,
                len: 3
            })
        );
        assert_eq!(
            rope.insert(4, 0),
            Err(RopeError::InsertOutOfRange { index: 4, len: 3 })
        );
        assert!(rope.remove_range(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_get_range_and_concat() {
        let data: Vec<u32> = (0..1_000).collect();
        let rope = Rope::from_slice(&data);
        let middle = rope.get_range(100, 600).unwrap();
        assert_eq!(middle.to_vec(), data[100..700].to_vec());
        middle.assert_invariants();

        let joined = Rope::concat(&middle, &rope);
        assert_eq!(joined.len(), 1_600);
        assert_eq!(joined.get(600), Ok(0));
        joined.assert_invariants();

        let all = Rope::concat_all([&rope, &middle, &rope]);
        assert_eq!(all.len(), 2_600);
        all.assert_invariants();
    }

    #[test]
    fn test_index_of_and_last_index_of() {
        let mut data = vec![0u8; 3_000];
        data[10] = 1;
        data[1_500] = 1;
        data[2_999] = 1;
        let rope = Rope::from_slice(&data);
        assert_eq!(rope.index_of(&1, 0, 3_000), Ok(Some(10)));
        assert_eq!(rope.index_of(&1, 11, 2_000), Ok(Some(1_500)));
        assert_eq!(rope.index_of(&1, 11, 1_000), Ok(None));
        assert_eq!(rope.last_index_of(&1, 0, 3_000), Ok(Some(2_999)));
        assert_eq!(rope.last_index_of(&1, 0, 2_999), Ok(Some(1_500)));
        assert_eq!(rope.last_index_of(&1, 11, 1_000), Ok(None));
        assert!(rope.contains(&1));
        assert!(!rope.contains(&2));
    }

    #[test]
    fn test_set_range_overwrites_span() {
        let mut rope = Rope::from_slice(&vec![0u16; 600]);
        rope.set_range(250, &[5; 20]).unwrap();
        let values = rope.to_vec();
        assert!(values[250..270].iter().all(|v| *v == 5));
        assert_eq!(values[249], 0);
        assert_eq!(values[270], 0);
        assert!(rope.set_range(590, &[1; 20]).is_err());
    }

    #[test]
    fn test_function_rope_evaluates_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Rope::from_fn(1_000, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            (0..1_000u32).collect()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let copy = lazy.clone();
        assert_eq!(lazy.get(999), Ok(999));
        assert_eq!(copy.get(3), Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_function_rope_mutation_leaves_source_intact() {
        let lazy = Rope::from_fn(300, || Rope::from_slice(&[1u8; 300]));
        let mut combined = Rope::concat(&Rope::from_slice(&[0u8; 300]), &lazy);
        combined.insert(450, 9).unwrap();
        combined.remove_range(0, 10).unwrap();
        assert_eq!(combined.len(), 591);
        assert_eq!(combined.get(440), Ok(9));
        assert_eq!(lazy.to_vec(), vec![1u8; 300]);
        combined.assert_invariants();
    }

    #[test]
    #[should_panic(expected = "wrong length")]
    fn test_function_rope_wrong_length_panics() {
        let lazy = Rope::from_fn(5, || Rope::from_slice(&[1, 2, 3]));
        let _ = lazy.get(0);
    }

    #[test]
    fn test_iter_matches_to_vec() {
        let data: Vec<u32> = (0..1_234).collect();
        let mut rope = Rope::from_slice(&data);
        rope.insert_slice(17, &[7; 300]).unwrap();
        let collected: Vec<u32> = rope.iter().collect();
        assert_eq!(collected, rope.to_vec());
        assert_eq!(rope.iter().len(), rope.len());
    }
}
