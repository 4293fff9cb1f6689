//! Tree nodes backing [`Rope`].
//!
//! Nodes are reference counted. A node reachable from more than one place is
//! shared and never written in place: every write path goes through
//! [`own`], which clones a shared node (shallowly) before handing out a mutable
//! reference.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use super::Rope;

/// Maximum number of elements stored in a leaf.
pub(crate) const NODE_SIZE: usize = 256;

pub(crate) type NodeRef<T> = Arc<RopeNode<T>>;

pub(crate) type Initializer<T> = Box<dyn FnOnce() -> Rope<T> + Send>;

pub(crate) enum RopeNode<T> {
    Leaf(Vec<T>),
    Concat(Concat<T>),
    Function(FunctionNode<T>),
}

pub(crate) struct Concat<T> {
    pub(crate) left: NodeRef<T>,
    pub(crate) right: NodeRef<T>,
    pub(crate) length: usize,
    pub(crate) height: u8,
}

/// A leaf whose content is produced on first access.
pub(crate) struct FunctionNode<T> {
    length: usize,
    state: ReentrantMutex<RefCell<FunctionState<T>>>,
}

enum FunctionState<T> {
    Pending(Initializer<T>),
    Evaluating,
    Ready(NodeRef<T>),
}

impl<T> FunctionNode<T> {
    pub(crate) fn new(length: usize, initializer: Initializer<T>) -> Self {
        Self {
            length,
            state: ReentrantMutex::new(RefCell::new(FunctionState::Pending(initializer))),
        }
    }

    /// Returns the evaluated content, running the initializer on first use.
    ///
    /// # Panics
    ///
    /// Panics if the initializer re-enters this node, if an earlier evaluation
    /// panicked, or if the produced rope has a different length than declared.
    pub(crate) fn content(&self) -> NodeRef<T> {
        let guard = self.state.lock();
        if let FunctionState::Ready(node) = &*guard.borrow() {
            return node.clone();
        }

        let previous = std::mem::replace(&mut *guard.borrow_mut(), FunctionState::Evaluating);
        let FunctionState::Pending(initializer) = previous else {
            panic!("rope function initializer was called recursively or failed earlier");
        };

        let mut node = initializer().root;
        if let RopeNode::Function(inner) = &*node {
            node = inner.content();
        }
        assert_eq!(
            node.len(),
            self.length,
            "rope function initializer returned a rope of the wrong length"
        );

        *guard.borrow_mut() = FunctionState::Ready(node.clone());
        node
    }
}

impl<T> RopeNode<T> {
    pub(crate) fn len(&self) -> usize {
        match self {
            RopeNode::Leaf(items) => items.len(),
            RopeNode::Concat(concat) => concat.length,
            RopeNode::Function(function) => function.length,
        }
    }

    pub(crate) fn height(&self) -> u8 {
        match self {
            RopeNode::Concat(concat) => concat.height,
            _ => 0,
        }
    }

    fn balance(&self) -> i32 {
        match self {
            RopeNode::Concat(concat) => concat.balance(),
            _ => 0,
        }
    }
}

impl<T: Clone> Clone for RopeNode<T> {
    fn clone(&self) -> Self {
        match self {
            RopeNode::Leaf(items) => {
                let mut copy = Vec::with_capacity(NODE_SIZE.max(items.len()));
                copy.extend_from_slice(items);
                RopeNode::Leaf(copy)
            }
            RopeNode::Concat(concat) => RopeNode::Concat(Concat {
                left: concat.left.clone(),
                right: concat.right.clone(),
                length: concat.length,
                height: concat.height,
            }),
            RopeNode::Function(function) => (*function.content()).clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RopeNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RopeNode::Leaf(items) => f.debug_tuple("Leaf").field(items).finish(),
            RopeNode::Concat(concat) => f
                .debug_struct("Concat")
                .field("length", &concat.length)
                .field("height", &concat.height)
                .field("left", &concat.left)
                .field("right", &concat.right)
                .finish(),
            RopeNode::Function(function) => f
                .debug_struct("Function")
                .field("length", &function.length)
                .finish_non_exhaustive(),
        }
    }
}

pub(crate) fn empty_leaf<T>() -> NodeRef<T> {
    Arc::new(RopeNode::Leaf(Vec::new()))
}

fn leaf_from<T: Clone>(items: &[T]) -> NodeRef<T> {
    let mut contents = Vec::with_capacity(NODE_SIZE);
    contents.extend_from_slice(items);
    Arc::new(RopeNode::Leaf(contents))
}

/// Builds a balanced tree holding `items`, filling leaves to capacity.
pub(crate) fn from_slice<T: Clone>(items: &[T]) -> NodeRef<T> {
    let leaf_count = items.len().div_ceil(NODE_SIZE).max(1);
    build(items, leaf_count)
}

fn build<T: Clone>(items: &[T], leaf_count: usize) -> NodeRef<T> {
    if leaf_count == 1 {
        return leaf_from(items);
    }
    let right_leaves = leaf_count / 2;
    let left_leaves = leaf_count - right_leaves;
    let (left_items, right_items) = items.split_at(left_leaves * NODE_SIZE);
    let left = build(left_items, left_leaves);
    let right = build(right_items, right_leaves);
    Arc::new(RopeNode::Concat(Concat::new(left, right)))
}

/// Returns a mutable reference to the node, cloning it first if shared.
///
/// Function nodes are replaced by their content, so the result is always a
/// leaf or concat node.
pub(crate) fn own<T: Clone>(node: &mut NodeRef<T>) -> &mut RopeNode<T> {
    if let RopeNode::Function(function) = &**node {
        *node = function.content();
    }
    Arc::make_mut(node)
}

impl<T> Concat<T> {
    fn new(left: NodeRef<T>, right: NodeRef<T>) -> Self {
        let mut concat = Self {
            length: left.len() + right.len(),
            height: 0,
            left,
            right,
        };
        concat.update_height();
        concat
    }

    fn balance(&self) -> i32 {
        i32::from(self.right.height()) - i32::from(self.left.height())
    }

    fn update_height(&mut self) {
        self.height = 1 + self.left.height().max(self.right.height());
    }
}

impl<T: Clone> Concat<T> {
    /// Restores AVL balance by rearranging the children; `self` stays the top node.
    fn rebalance(&mut self) {
        while self.balance().abs() > 1 {
            if self.balance() > 1 {
                if self.right.balance() < 0
                    && let RopeNode::Concat(right) = Arc::make_mut(&mut self.right)
                {
                    right.rotate_right();
                }
                self.rotate_left();
                if let RopeNode::Concat(left) = Arc::make_mut(&mut self.left) {
                    left.rebalance();
                }
            } else {
                if self.left.balance() > 0
                    && let RopeNode::Concat(left) = Arc::make_mut(&mut self.left)
                {
                    left.rotate_left();
                }
                self.rotate_right();
                if let RopeNode::Concat(right) = Arc::make_mut(&mut self.right) {
                    right.rebalance();
                }
            }
        }
        self.update_height();
    }

    //       self               self
    //       /  \               /  \
    //      A   right   ===>  left  C
    //           / \          / \
    //          B   C        A   B
    fn rotate_left(&mut self) {
        let RopeNode::Concat(right) = &*self.right else {
            return;
        };
        let (b, c) = (right.left.clone(), right.right.clone());
        let a = self.left.clone();
        self.left = merged(a, b);
        self.right = c;
        self.update_height();
    }

    //       self               self
    //       /  \               /  \
    //     left  C   ===>      A  right
    //     / \                     / \
    //    A   B                   B   C
    fn rotate_right(&mut self) {
        let RopeNode::Concat(left) = &*self.left else {
            return;
        };
        let (a, b) = (left.left.clone(), left.right.clone());
        let c = self.right.clone();
        self.left = a;
        self.right = merged(b, c);
        self.update_height();
    }
}

/// Joins two nodes without rebalancing, collapsing into a leaf when small enough.
fn merged<T: Clone>(left: NodeRef<T>, right: NodeRef<T>) -> NodeRef<T> {
    if left.len() + right.len() <= NODE_SIZE {
        let mut contents = Vec::with_capacity(NODE_SIZE);
        copy_to(&left, 0, left.len(), &mut contents);
        copy_to(&right, 0, right.len(), &mut contents);
        return Arc::new(RopeNode::Leaf(contents));
    }
    Arc::new(RopeNode::Concat(Concat::new(left, right)))
}

/// Concatenates two subtrees into a balanced tree.
pub(crate) fn concat<T: Clone>(left: NodeRef<T>, right: NodeRef<T>) -> NodeRef<T> {
    if left.len() == 0 {
        return right;
    }
    if right.len() == 0 {
        return left;
    }
    if left.len() + right.len() <= NODE_SIZE {
        return merged(left, right);
    }
    let mut node = Concat::new(left, right);
    node.rebalance();
    Arc::new(RopeNode::Concat(node))
}

/// Splits `node` at `offset` (exclusive of both ends) into two balanced trees.
fn split<T: Clone>(node: &NodeRef<T>, offset: usize) -> (NodeRef<T>, NodeRef<T>) {
    debug_assert!(offset > 0 && offset < node.len());
    match &**node {
        RopeNode::Leaf(items) => (leaf_from(&items[..offset]), leaf_from(&items[offset..])),
        RopeNode::Function(function) => split(&function.content(), offset),
        RopeNode::Concat(c) => {
            let left_len = c.left.len();
            if offset < left_len {
                let (ll, lr) = split(&c.left, offset);
                (ll, concat(lr, c.right.clone()))
            } else if offset > left_len {
                let (rl, rr) = split(&c.right, offset - left_len);
                (concat(c.left.clone(), rl), rr)
            } else {
                (c.left.clone(), c.right.clone())
            }
        }
    }
}

/// Inserts the subtree `new_elements` at `offset`.
pub(crate) fn insert_node<T: Clone>(node: &mut NodeRef<T>, offset: usize, new_elements: NodeRef<T>) {
    let current = node.clone();
    *node = if offset == 0 {
        concat(new_elements, current)
    } else if offset == current.len() {
        concat(current, new_elements)
    } else {
        let (left, right) = split(&current, offset);
        concat(concat(left, new_elements), right)
    };
}

/// Inserts `items` at `offset`, editing the target leaf in place when it has room.
pub(crate) fn insert_items<T: Clone>(node: &mut NodeRef<T>, offset: usize, items: &[T]) {
    debug_assert!(!items.is_empty());
    if node.len() + items.len() < NODE_SIZE {
        if let RopeNode::Leaf(contents) = own(node) {
            contents.splice(offset..offset, items.iter().cloned());
            return;
        }
    }
    if node.height() == 0 {
        insert_node(node, offset, from_slice(items));
        return;
    }
    if let RopeNode::Concat(c) = own(node) {
        let left_len = c.left.len();
        if offset < left_len {
            insert_items(&mut c.left, offset, items);
        } else {
            insert_items(&mut c.right, offset - left_len, items);
        }
        c.length += items.len();
        c.rebalance();
    }
}

/// Removes `count > 0` elements starting at `index`.
pub(crate) fn remove_range<T: Clone>(node: &mut NodeRef<T>, index: usize, count: usize) {
    debug_assert!(count > 0 && index + count <= node.len());
    if index == 0 && count == node.len() {
        *node = empty_leaf();
        return;
    }
    let end = index + count;
    let replacement = match own(node) {
        RopeNode::Leaf(contents) => {
            contents.drain(index..end);
            None
        }
        RopeNode::Concat(c) => {
            let left_len = c.left.len();
            if end <= left_len {
                remove_range(&mut c.left, index, count);
            } else if index >= left_len {
                remove_range(&mut c.right, index - left_len, count);
            } else {
                let on_left = left_len - index;
                remove_range(&mut c.left, index, on_left);
                remove_range(&mut c.right, 0, count - on_left);
            }
            if c.left.len() == 0 {
                Some(c.right.clone())
            } else if c.right.len() == 0 {
                Some(c.left.clone())
            } else {
                c.length -= count;
                if c.length <= NODE_SIZE {
                    Some(merged(c.left.clone(), c.right.clone()))
                } else {
                    c.rebalance();
                    None
                }
            }
        }
        RopeNode::Function(_) => None,
    };
    if let Some(replacement) = replacement {
        *node = replacement;
    }
}

/// Overwrites the element at `offset`.
pub(crate) fn set_element<T: Clone>(node: &mut NodeRef<T>, offset: usize, value: T) {
    match own(node) {
        RopeNode::Leaf(contents) => contents[offset] = value,
        RopeNode::Concat(c) => {
            let left_len = c.left.len();
            if offset < left_len {
                set_element(&mut c.left, offset, value);
            } else {
                set_element(&mut c.right, offset - left_len, value);
            }
            // Evaluated function nodes may have changed child heights.
            c.rebalance();
        }
        RopeNode::Function(_) => {}
    }
}

/// Overwrites `items.len()` elements starting at `offset`.
pub(crate) fn store_elements<T: Clone>(node: &mut NodeRef<T>, offset: usize, items: &[T]) {
    if items.is_empty() {
        return;
    }
    match own(node) {
        RopeNode::Leaf(contents) => contents[offset..offset + items.len()].clone_from_slice(items),
        RopeNode::Concat(c) => {
            let left_len = c.left.len();
            if offset + items.len() <= left_len {
                store_elements(&mut c.left, offset, items);
            } else if offset >= left_len {
                store_elements(&mut c.right, offset - left_len, items);
            } else {
                let (on_left, on_right) = items.split_at(left_len - offset);
                store_elements(&mut c.left, offset, on_left);
                store_elements(&mut c.right, 0, on_right);
            }
            c.rebalance();
        }
        RopeNode::Function(_) => {}
    }
}

/// Calls `visit` with each leaf slice covering `[index, index + count)`, in order.
pub(crate) fn visit<T, F>(node: &RopeNode<T>, index: usize, count: usize, visit_leaf: &mut F)
where
    F: FnMut(&[T]),
{
    if count == 0 {
        return;
    }
    match node {
        RopeNode::Leaf(items) => visit_leaf(&items[index..index + count]),
        RopeNode::Function(function) => visit(&function.content(), index, count, visit_leaf),
        RopeNode::Concat(c) => {
            let left_len = c.left.len();
            if index + count <= left_len {
                visit(&c.left, index, count, visit_leaf);
            } else if index >= left_len {
                visit(&c.right, index - left_len, count, visit_leaf);
            } else {
                let on_left = left_len - index;
                visit(&c.left, index, on_left, visit_leaf);
                visit(&c.right, 0, count - on_left, visit_leaf);
            }
        }
    }
}

pub(crate) fn copy_to<T: Clone>(node: &RopeNode<T>, index: usize, count: usize, out: &mut Vec<T>) {
    out.reserve(count);
    visit(node, index, count, &mut |items: &[T]| out.extend_from_slice(items));
}

/// Panics if any structural invariant is violated. Function nodes are not forced.
pub(crate) fn check_invariants<T>(node: &RopeNode<T>) {
    match node {
        RopeNode::Leaf(items) => assert!(items.len() <= NODE_SIZE, "leaf overflow"),
        RopeNode::Function(_) => {}
        RopeNode::Concat(c) => {
            assert_eq!(c.length, c.left.len() + c.right.len(), "concat length");
            assert!(c.length > NODE_SIZE, "concat node small enough to be a leaf");
            assert_eq!(
                c.height,
                1 + c.left.height().max(c.right.height()),
                "concat height"
            );
            assert!(c.balance().abs() <= 1, "concat node out of balance");
            check_invariants(&c.left);
            check_invariants(&c.right);
        }
    }
}
