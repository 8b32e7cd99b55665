//! B-tree of minimum degree `t`
//!
//! Every node holds at most `2t - 1` values; every node but the root at
//! least `t - 1`. Insert splits full nodes on the way down so the leaf it
//! ends in always has room. Remove makes sure each node it descends into has
//! at least `t` values (borrowing from or merging with a sibling), so a
//! value can always be taken out without a second pass.
//!
//! Nodes live in an arena keyed by node pointer. A node freed by a merge or
//! a root collapse leaves a pointer gap.
//!
//! # File format
//!
//! ```text
//! [header 44 bytes]  see BTreeHeader
//! [slot p >= 1]      leaf u64 | key_quantity u64 | (2t-1) payloads | 2t child pointers u64
//! ```

use super::bst;
use super::facade::TreeKind;
use super::node::{NodeAllocator, NodePointer, NULL_POINTER};
use super::ordering::KeyOrdering;
use super::{TraversalOrder, TreeMetadata};
use crate::config::{DuplicatePolicy, TreeConfig};
use crate::storage::record::{get_u64, put_u64};
use crate::storage::{BTreeHeader, PayloadCodec, RecordLayout, RecordReader, RecordWriter};
use crate::{Result, TreeError};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
struct BTreeNode<V> {
    node_pointer: NodePointer,
    leaf: bool,
    values: Vec<V>,
    children: Vec<NodePointer>,
}

impl<V> BTreeNode<V> {
    fn empty_leaf(node_pointer: NodePointer) -> Self {
        Self { node_pointer, leaf: true, values: Vec::new(), children: Vec::new() }
    }
}

fn missing(pointer: NodePointer) -> TreeError {
    TreeError::corruption(format!("node {} is not in the arena", pointer))
}

/// Bytes per record for degree `t` and the given payload size
fn node_record_size(t: usize, payload: usize) -> Result<u64> {
    let max_values = t.checked_mul(2).and_then(|n| n.checked_sub(1));
    max_values
        .and_then(|n| n.checked_mul(payload))
        .and_then(|bytes| bytes.checked_add(16))
        .and_then(|bytes| t.checked_mul(16).and_then(|c| bytes.checked_add(c)))
        .map(|bytes| bytes as u64)
        .ok_or_else(|| TreeError::InvalidArgument(format!("record for degree {} overflows", t)))
}

struct Inner<V> {
    nodes: AHashMap<NodePointer, BTreeNode<V>>,
    root: NodePointer,
    allocator: NodeAllocator,
    /// Edges from the root to any leaf
    height: usize,
    key_quantity: u64,
    node_size: u64,
}

impl<V> Inner<V> {
    fn empty() -> Result<Self> {
        let mut allocator = NodeAllocator::new();
        let root = allocator.allocate()?;
        let mut nodes = AHashMap::new();
        nodes.insert(root, BTreeNode::empty_leaf(root));
        Ok(Self { nodes, root, allocator, height: 0, key_quantity: 0, node_size: 0 })
    }

    fn node(&self, pointer: NodePointer) -> Result<&BTreeNode<V>> {
        self.nodes.get(&pointer).ok_or_else(|| missing(pointer))
    }

    fn node_mut(&mut self, pointer: NodePointer) -> Result<&mut BTreeNode<V>> {
        self.nodes.get_mut(&pointer).ok_or_else(|| missing(pointer))
    }

    fn child_at(&self, pointer: NodePointer, index: usize) -> Result<NodePointer> {
        self.node(pointer)?
            .children
            .get(index)
            .copied()
            .ok_or_else(|| TreeError::corruption(format!("node {} has no child {}", pointer, index)))
    }

    /// Node and slot holding `key`
    fn find<K: ?Sized>(&self, key: &K, ordering: &KeyOrdering<V, K>) -> Option<(NodePointer, usize)> {
        let mut pointer = self.root;
        loop {
            let node = self.nodes.get(&pointer)?;
            match node.values.binary_search_by(|v| ordering.compare_key(v, key)) {
                Ok(i) => return Some((pointer, i)),
                Err(_) if node.leaf => return None,
                Err(i) => pointer = *node.children.get(i)?,
            }
        }
    }

    /// Move the median of the full child `i` of `parent` up, creating `sibling`
    fn split_child(&mut self, parent: NodePointer, i: usize, sibling: NodePointer, t: usize) -> Result<()> {
        let child_pointer = self.child_at(parent, i)?;
        let child = self.node_mut(child_pointer)?;
        if child.values.len() != 2 * t - 1 {
            return Err(TreeError::corruption(format!(
                "split of node {} holding {} values",
                child_pointer,
                child.values.len()
            )));
        }

        let upper_values = child.values.split_off(t);
        let median = child.values.pop().ok_or_else(|| missing(child_pointer))?;
        let upper_children = if child.leaf { Vec::new() } else { child.children.split_off(t) };
        let leaf = child.leaf;

        self.nodes.insert(
            sibling,
            BTreeNode { node_pointer: sibling, leaf, values: upper_values, children: upper_children },
        );
        let parent_node = self.node_mut(parent)?;
        parent_node.values.insert(i, median);
        parent_node.children.insert(i + 1, sibling);

        trace!(parent, child = child_pointer, sibling, "split child");
        Ok(())
    }

    /// Grow the tree by one level above a full root
    fn split_root(&mut self, t: usize) -> Result<()> {
        let new_root = self.allocator.allocate()?;
        let sibling = match self.allocator.allocate() {
            Ok(pointer) => pointer,
            Err(e) => {
                self.allocator.release();
                return Err(e);
            }
        };

        let old_root = self.root;
        self.nodes.insert(
            new_root,
            BTreeNode { node_pointer: new_root, leaf: false, values: Vec::new(), children: vec![old_root] },
        );
        self.root = new_root;
        self.height += 1;
        self.split_child(new_root, 0, sibling, t)?;

        debug!(root = new_root, height = self.height, "split root");
        Ok(())
    }

    /// Insert below a root that is known not to be full
    fn insert_non_full<K: ?Sized>(&mut self, value: V, t: usize, ordering: &KeyOrdering<V, K>) -> Result<()> {
        let mut pointer = self.root;
        loop {
            let node = self.node(pointer)?;
            let mut i = node
                .values
                .partition_point(|existing| ordering.compare_values(&value, existing) == Ordering::Greater);

            if node.leaf {
                self.node_mut(pointer)?.values.insert(i, value);
                return Ok(());
            }

            let child = self.child_at(pointer, i)?;
            if self.node(child)?.values.len() == 2 * t - 1 {
                let sibling = self.allocator.allocate()?;
                self.split_child(pointer, i, sibling, t)?;
                let median = &self.node(pointer)?.values[i];
                if ordering.compare_values(&value, median) == Ordering::Greater {
                    i += 1;
                }
            }
            pointer = self.child_at(pointer, i)?;
        }
    }

    /// Rotate one value from the left sibling through the parent into child `i`
    fn borrow_from_left(&mut self, parent: NodePointer, i: usize) -> Result<()> {
        let left_pointer = self.child_at(parent, i - 1)?;
        let child_pointer = self.child_at(parent, i)?;

        let left = self.node_mut(left_pointer)?;
        let moved = left.values.pop().ok_or_else(|| missing(left_pointer))?;
        let moved_child = if left.leaf { None } else { left.children.pop() };

        let separator = std::mem::replace(&mut self.node_mut(parent)?.values[i - 1], moved);
        let child = self.node_mut(child_pointer)?;
        child.values.insert(0, separator);
        if let Some(grandchild) = moved_child {
            child.children.insert(0, grandchild);
        }
        Ok(())
    }

    /// Rotate one value from the right sibling through the parent into child `i`
    fn borrow_from_right(&mut self, parent: NodePointer, i: usize) -> Result<()> {
        let child_pointer = self.child_at(parent, i)?;
        let right_pointer = self.child_at(parent, i + 1)?;

        let right = self.node_mut(right_pointer)?;
        if right.values.is_empty() || (!right.leaf && right.children.is_empty()) {
            return Err(missing(right_pointer));
        }
        let moved = right.values.remove(0);
        let moved_child = if right.leaf { None } else { Some(right.children.remove(0)) };

        let separator = std::mem::replace(&mut self.node_mut(parent)?.values[i], moved);
        let child = self.node_mut(child_pointer)?;
        child.values.push(separator);
        if let Some(grandchild) = moved_child {
            child.children.push(grandchild);
        }
        Ok(())
    }

    /// Fold child `i + 1` and the separator between them into child `i`
    fn merge_children(&mut self, parent: NodePointer, i: usize) -> Result<()> {
        let left_pointer = self.child_at(parent, i)?;
        let right_pointer = self.child_at(parent, i + 1)?;

        let right = self.nodes.remove(&right_pointer).ok_or_else(|| missing(right_pointer))?;
        let parent_node = self.node_mut(parent)?;
        let separator = parent_node.values.remove(i);
        parent_node.children.remove(i + 1);

        let left = self.node_mut(left_pointer)?;
        left.values.push(separator);
        left.values.extend(right.values);
        left.children.extend(right.children);
        self.allocator.release();

        trace!(parent, left = left_pointer, right = right_pointer, "merged children");
        Ok(())
    }

    /// Give child `i` of `parent` at least `t` values; returns the index of
    /// the child that now covers the same key range
    fn fill_child(&mut self, parent: NodePointer, i: usize, t: usize) -> Result<usize> {
        let separators = self.node(parent)?.values.len();

        if i > 0 && self.node(self.child_at(parent, i - 1)?)?.values.len() >= t {
            self.borrow_from_left(parent, i)?;
            return Ok(i);
        }
        if i < separators && self.node(self.child_at(parent, i + 1)?)?.values.len() >= t {
            self.borrow_from_right(parent, i)?;
            return Ok(i);
        }
        if i < separators {
            self.merge_children(parent, i)?;
            Ok(i)
        } else if i > 0 {
            self.merge_children(parent, i - 1)?;
            Ok(i - 1)
        } else {
            Err(TreeError::corruption(format!("node {} has no siblings for child {}", parent, i)))
        }
    }

    /// Descend into child `i` of `pointer`, topping it up first if needed
    fn descend(&mut self, pointer: NodePointer, i: usize, t: usize) -> Result<NodePointer> {
        let child = self.child_at(pointer, i)?;
        if self.node(child)?.values.len() >= t {
            return Ok(child);
        }
        let index = self.fill_child(pointer, i, t)?;
        self.child_at(pointer, index)
    }

    /// Remove the largest value below `pointer` (which holds at least `t` values)
    fn pop_max(&mut self, mut pointer: NodePointer, t: usize) -> Result<V> {
        loop {
            let node = self.node(pointer)?;
            if node.leaf {
                return self.node_mut(pointer)?.values.pop().ok_or_else(|| missing(pointer));
            }
            let last = node.values.len();
            pointer = self.descend(pointer, last, t)?;
        }
    }

    /// Remove the smallest value below `pointer` (which holds at least `t` values)
    fn pop_min(&mut self, mut pointer: NodePointer, t: usize) -> Result<V> {
        loop {
            let node = self.node(pointer)?;
            if node.leaf {
                let node = self.node_mut(pointer)?;
                if node.values.is_empty() {
                    return Err(missing(pointer));
                }
                return Ok(node.values.remove(0));
            }
            pointer = self.descend(pointer, 0, t)?;
        }
    }

    fn delete<K: ?Sized>(&mut self, key: &K, t: usize, ordering: &KeyOrdering<V, K>) -> Result<Option<V>> {
        let mut pointer = self.root;
        loop {
            let node = self.node(pointer)?;
            let slot = node.values.binary_search_by(|v| ordering.compare_key(v, key));

            match (slot, node.leaf) {
                (Ok(i), true) => return Ok(Some(self.node_mut(pointer)?.values.remove(i))),
                (Err(_), true) => return Ok(None),
                (Ok(i), false) => {
                    let left = self.child_at(pointer, i)?;
                    let right = self.child_at(pointer, i + 1)?;

                    if self.node(left)?.values.len() >= t {
                        let predecessor = self.pop_max(left, t)?;
                        let slot = &mut self.node_mut(pointer)?.values[i];
                        return Ok(Some(std::mem::replace(slot, predecessor)));
                    }
                    if self.node(right)?.values.len() >= t {
                        let successor = self.pop_min(right, t)?;
                        let slot = &mut self.node_mut(pointer)?.values[i];
                        return Ok(Some(std::mem::replace(slot, successor)));
                    }
                    // Both neighbours minimal: the key sinks into the merged node.
                    self.merge_children(pointer, i)?;
                    pointer = left;
                }
                (Err(i), false) => pointer = self.descend(pointer, i, t)?,
            }
        }
    }

    /// Replace an empty internal root by its only child
    fn collapse_root(&mut self) -> Result<()> {
        let root = self.node(self.root)?;
        if !root.values.is_empty() || root.leaf {
            return Ok(());
        }
        let child = root.children.first().copied().ok_or_else(|| missing(self.root))?;
        let old_root = self.root;
        self.nodes.remove(&old_root);
        self.allocator.release();
        self.root = child;
        self.height = self.height.saturating_sub(1);

        debug!(old_root, root = child, height = self.height, "collapsed root");
        Ok(())
    }

    fn walk(&self, pointer: NodePointer, order: TraversalOrder, visit: &mut dyn FnMut(&V)) {
        let node = match self.nodes.get(&pointer) {
            Some(node) => node,
            None => return,
        };
        match order {
            TraversalOrder::PreOrder => {
                node.values.iter().for_each(|v| visit(v));
                for child in &node.children {
                    self.walk(*child, order, visit);
                }
            }
            TraversalOrder::InOrder => {
                for (i, v) in node.values.iter().enumerate() {
                    if let Some(child) = node.children.get(i) {
                        self.walk(*child, order, visit);
                    }
                    visit(v);
                }
                if let Some(child) = node.children.get(node.values.len()) {
                    self.walk(*child, order, visit);
                }
            }
            TraversalOrder::PostOrder => {
                for child in &node.children {
                    self.walk(*child, order, visit);
                }
                node.values.iter().for_each(|v| visit(v));
            }
        }
    }

    fn collect_pointers(&self, pointer: NodePointer, out: &mut Vec<NodePointer>) {
        if let Some(node) = self.nodes.get(&pointer) {
            out.push(node.node_pointer);
            for child in &node.children {
                self.collect_pointers(*child, out);
            }
        }
    }

    /// Check every structural invariant and the bookkeeping counters
    fn validate<K: ?Sized>(&self, t: usize, ordering: &KeyOrdering<V, K>) -> std::result::Result<(), String> {
        let mut nodes = 0u64;
        let mut keys = 0u64;
        let mut check = NodeCheck { inner: self, t, ordering, nodes: &mut nodes, keys: &mut keys };
        check.visit(self.root, 0, None, None)?;

        if nodes != self.allocator.node_count() {
            return Err(format!("found {} nodes, expected {}", nodes, self.allocator.node_count()));
        }
        if keys != self.key_quantity {
            return Err(format!("found {} values, expected {}", keys, self.key_quantity));
        }
        if self.nodes.len() as u64 != nodes {
            return Err(format!("arena holds {} nodes, {} reachable", self.nodes.len(), nodes));
        }
        Ok(())
    }
}

struct NodeCheck<'a, V, K: ?Sized> {
    inner: &'a Inner<V>,
    t: usize,
    ordering: &'a KeyOrdering<V, K>,
    nodes: &'a mut u64,
    keys: &'a mut u64,
}

impl<'a, V, K: ?Sized> NodeCheck<'a, V, K> {
    fn visit(
        &mut self,
        pointer: NodePointer,
        depth: usize,
        lower: Option<&'a V>,
        upper: Option<&'a V>,
    ) -> std::result::Result<(), String> {
        let inner = self.inner;
        let node = inner.nodes.get(&pointer).ok_or(format!("node {} missing", pointer))?;
        let n = node.values.len();
        let is_root = pointer == inner.root;
        *self.nodes += 1;
        *self.keys += n as u64;

        if n > 2 * self.t - 1 {
            return Err(format!("node {} holds {} values", pointer, n));
        }
        if !is_root && n < self.t - 1 {
            return Err(format!("node {} holds only {} values", pointer, n));
        }
        if !node.leaf && n == 0 {
            return Err(format!("internal node {} is empty", pointer));
        }

        let less = |a: &V, b: &V| self.ordering.compare_values(a, b) == Ordering::Less;
        if node.values.windows(2).any(|pair| !less(&pair[0], &pair[1])) {
            return Err(format!("node {} values out of order", pointer));
        }
        if let (Some(bound), Some(first)) = (lower, node.values.first()) {
            if !less(bound, first) {
                return Err(format!("node {} violates its lower bound", pointer));
            }
        }
        if let (Some(bound), Some(last)) = (upper, node.values.last()) {
            if !less(last, bound) {
                return Err(format!("node {} violates its upper bound", pointer));
            }
        }

        if node.leaf {
            if !node.children.is_empty() {
                return Err(format!("leaf {} has children", pointer));
            }
            if depth != inner.height {
                return Err(format!("leaf {} at depth {}, height is {}", pointer, depth, inner.height));
            }
            return Ok(());
        }

        if depth >= inner.height {
            return Err(format!("internal node {} at depth {}, height is {}", pointer, depth, inner.height));
        }
        if node.children.len() != n + 1 {
            return Err(format!("node {} has {} children for {} values", pointer, node.children.len(), n));
        }
        for (i, child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { node.values.get(i - 1) };
            let child_upper = node.values.get(i).or(upper);
            self.visit(*child, depth + 1, child_lower, child_upper)?;
        }
        Ok(())
    }
}

/// Multiway search tree
///
/// Like the binary variants, every operation holds one mutex for its whole
/// duration and visitors must not re-enter the tree.
pub struct BTree<V, K: ?Sized = V> {
    inner: Mutex<Inner<V>>,
    ordering: KeyOrdering<V, K>,
    config: TreeConfig,
}

impl<V, K: ?Sized> BTree<V, K> {
    /// Empty tree: a single empty leaf root at pointer 1, height 0
    pub fn new(ordering: KeyOrdering<V, K>, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { inner: Mutex::new(Inner::empty()?), ordering, config })
    }

    /// Insert strictly ascending values one by one
    pub fn from_sorted(values: Vec<V>, ordering: KeyOrdering<V, K>, config: TreeConfig) -> Result<Self> {
        if let Some(i) = values
            .windows(2)
            .position(|pair| ordering.compare_values(&pair[0], &pair[1]) != Ordering::Less)
        {
            return Err(TreeError::InvalidArgument(format!(
                "bulk input is not strictly ascending at index {}",
                i + 1
            )));
        }

        let tree = Self::new(ordering, config)?;
        for value in values {
            tree.insert(value)?;
        }
        Ok(tree)
    }

    pub fn degree(&self) -> usize {
        self.config.degree
    }

    pub fn ordering(&self) -> &KeyOrdering<V, K> {
        &self.ordering
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Insert `value`; with `DuplicatePolicy::Replace` the displaced value is returned
    ///
    /// A rejected duplicate never splits anything: the key is looked up
    /// before the descent starts.
    pub fn insert(&self, value: V) -> Result<Option<V>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let t = self.config.degree;

        if let Some((pointer, i)) = inner.find(self.ordering.key_of(&value), &self.ordering) {
            return match self.config.duplicates {
                DuplicatePolicy::Replace => {
                    let slot = &mut inner.node_mut(pointer)?.values[i];
                    Ok(Some(std::mem::replace(slot, value)))
                }
                DuplicatePolicy::Reject => Err(TreeError::DuplicateKey),
            };
        }

        if inner.node(inner.root)?.values.len() == 2 * t - 1 {
            inner.split_root(t)?;
        }
        inner.insert_non_full(value, t, &self.ordering)?;
        inner.key_quantity += 1;
        Ok(None)
    }

    /// Remove the value stored under `key`
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // Merges on the way down are only worth doing for a hit.
        if inner.find(key, &self.ordering).is_none() {
            return Ok(None);
        }

        let removed = inner.delete(key, self.config.degree, &self.ordering)?;
        if removed.is_some() {
            inner.key_quantity -= 1;
        }
        inner.collapse_root()?;
        Ok(removed)
    }

    /// Lend the value stored under `key` to `f`
    pub fn search_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let inner = self.inner.lock();
        let (pointer, i) = inner.find(key, &self.ordering)?;
        inner.nodes.get(&pointer).and_then(|node| node.values.get(i)).map(f)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().find(key, &self.ordering).is_some()
    }

    pub fn traverse(&self, order: TraversalOrder, mut visit: impl FnMut(&V)) {
        let inner = self.inner.lock();
        inner.walk(inner.root, order, &mut visit);
    }

    /// Values stored
    pub fn len(&self) -> u64 {
        self.inner.lock().key_quantity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Edges from the root to the leaves
    pub fn height(&self) -> usize {
        self.inner.lock().height
    }

    /// Back to a single empty leaf; node pointers keep counting
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut allocator = inner.allocator;
        allocator.reset_count();
        let root = allocator.allocate()?;

        inner.nodes.clear();
        inner.nodes.insert(root, BTreeNode::empty_leaf(root));
        inner.root = root;
        inner.allocator = allocator;
        inner.height = 0;
        inner.key_quantity = 0;
        Ok(())
    }

    pub fn metadata(&self) -> TreeMetadata {
        let inner = self.inner.lock();
        TreeMetadata {
            kind: TreeKind::BTree,
            node_count: inner.allocator.node_count(),
            node_size: inner.node_size,
            next_node_pointer: inner.allocator.next_pointer(),
            height: inner.height,
            key_quantity: inner.key_quantity,
            root_address: inner.root,
            degree: Some(self.config.degree),
        }
    }

    /// Node pointers in pre-order
    pub fn node_pointers(&self) -> Vec<NodePointer> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        inner.collect_pointers(inner.root, &mut out);
        out
    }

    /// Values per node in pre-order
    pub fn node_sizes(&self) -> Vec<usize> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut stack = vec![inner.root];
        while let Some(pointer) = stack.pop() {
            if let Some(node) = inner.nodes.get(&pointer) {
                out.push(node.values.len());
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    pub fn check_invariants(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.validate(self.config.degree, &self.ordering).map_err(TreeError::Corruption)
    }

    /// Write the tree to `path`; the previous file is replaced atomically
    pub fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let t = self.config.degree;
        let payload = codec.payload_size();
        let record_size = node_record_size(t, payload)?;

        let too_large = |what: &str| TreeError::ResourceExhausted(format!("{} does not fit the header", what));
        let header = BTreeHeader {
            node_count: inner.allocator.node_count(),
            node_size: record_size,
            key_quantity: inner.key_quantity,
            root_address: inner.root,
            degree: i32::try_from(t).map_err(|_| too_large("degree"))?,
            node_quantity: i32::try_from(inner.allocator.node_count()).map_err(|_| too_large("node count"))?,
            height: i32::try_from(inner.height).map_err(|_| too_large("height"))?,
        };

        let mut writer = RecordWriter::create(path, RecordLayout::new(BTreeHeader::SIZE, record_size), self.config.sync)?;
        header.write_to(writer.header_writer()?)?;

        let child_base = 16 + (2 * t - 1) * payload;
        let mut buf = vec![0u8; record_size as usize];
        let mut stack = vec![inner.root];
        while let Some(pointer) = stack.pop() {
            let node = inner.node(pointer)?;
            buf.fill(0);
            put_u64(&mut buf, 0, u64::from(node.leaf));
            put_u64(&mut buf, 8, node.values.len() as u64);
            for (i, value) in node.values.iter().enumerate() {
                let offset = 16 + i * payload;
                codec.encode(value, &mut buf[offset..offset + payload])?;
            }
            for (i, child) in node.children.iter().enumerate() {
                put_u64(&mut buf, child_base + i * 8, *child);
            }
            writer.write_record(pointer, &buf)?;
            stack.extend(node.children.iter().rev());
        }
        writer.commit()?;
        inner.node_size = record_size;

        info!(
            path = %path.display(),
            node_count = header.node_count,
            key_quantity = header.key_quantity,
            record_size,
            "serialized btree"
        );
        Ok(())
    }

    /// Load a file written by `serialize`
    ///
    /// The degree stored in the file overrides `config.degree`.
    pub fn parse(
        path: &Path,
        codec: &dyn PayloadCodec<V>,
        ordering: KeyOrdering<V, K>,
        config: TreeConfig,
    ) -> Result<Self> {
        let mut reader = RecordReader::open(path, BTreeHeader::SIZE)?;
        let header = BTreeHeader::read_from(reader.header_reader()?)?;

        let t = usize::try_from(header.degree)
            .map_err(|_| TreeError::Corruption(format!("invalid degree {}", header.degree)))?;
        let config = config.with_degree(t);
        config.validate()?;

        let payload = codec.payload_size();
        let record_size = node_record_size(t, payload)?;
        if header.node_size != record_size {
            warn!(path = %path.display(), file = header.node_size, expected = record_size, "record size mismatch");
            return Err(TreeError::PayloadSize {
                expected: record_size as usize,
                actual: header.node_size as usize,
            });
        }
        reader.set_record_size(record_size)?;

        let corrupt = |reason: String| {
            warn!(path = %path.display(), %reason, "corrupted btree file");
            TreeError::Corruption(reason)
        };

        let child_base = 16 + (2 * t - 1) * payload;
        let mut buf = vec![0u8; record_size as usize];
        let mut nodes = AHashMap::new();
        let mut visited = AHashSet::new();
        let mut max_pointer = NULL_POINTER;
        let mut stack = vec![header.root_address];

        while let Some(pointer) = stack.pop() {
            if nodes.len() as u64 >= header.node_count {
                return Err(corrupt(format!("more than {} nodes reachable", header.node_count)));
            }
            reader.seek_record(pointer)?;
            let pointer = reader.cursor_pointer()?;
            if pointer == NULL_POINTER || !visited.insert(pointer) {
                return Err(corrupt(format!("node {} is linked twice", pointer)));
            }
            reader.read_record(&mut buf)?;

            let leaf = match get_u64(&buf, 0)? {
                0 => false,
                1 => true,
                other => return Err(corrupt(format!("node {} has leaf flag {}", pointer, other))),
            };
            let n = get_u64(&buf, 8)? as usize;
            if n > 2 * t - 1 {
                return Err(corrupt(format!("node {} claims {} values", pointer, n)));
            }

            let values = (0..n)
                .map(|i| {
                    let offset = 16 + i * payload;
                    codec.decode(&buf[offset..offset + payload])
                })
                .collect::<Result<Vec<V>>>()?;
            let children = if leaf {
                Vec::new()
            } else {
                (0..=n)
                    .map(|i| get_u64(&buf, child_base + i * 8))
                    .collect::<Result<Vec<NodePointer>>>()?
            };
            if children.contains(&NULL_POINTER) {
                return Err(corrupt(format!("node {} has a null child", pointer)));
            }

            stack.extend(children.iter().rev());
            max_pointer = max_pointer.max(pointer);
            nodes.insert(pointer, BTreeNode { node_pointer: pointer, leaf, values, children });
        }

        if nodes.len() as u64 != header.node_count {
            return Err(corrupt(format!(
                "header records {} nodes, found {}",
                header.node_count,
                nodes.len()
            )));
        }

        let node_count = nodes.len() as u64;
        // Every non-root internal node has at least two children.
        if header.height as u64 > bst::logarithmic_depth(node_count) as u64 {
            return Err(corrupt(format!("height {} for {} nodes", header.height, node_count)));
        }
        let inner = Inner {
            nodes,
            root: header.root_address,
            allocator: NodeAllocator::resume(max_pointer, node_count)?,
            height: header.height as usize,
            key_quantity: header.key_quantity,
            node_size: record_size,
        };
        inner.validate(t, &ordering).map_err(corrupt)?;

        debug!(
            path = %path.display(),
            node_count,
            key_quantity = header.key_quantity,
            degree = t,
            "parsed btree"
        );
        Ok(Self { inner: Mutex::new(inner), ordering, config })
    }
}

impl<V: Clone, K: ?Sized> BTree<V, K> {
    pub fn search(&self, key: &K) -> Option<V> {
        self.search_with(key, V::clone)
    }

    /// All values in key order
    pub fn to_vec(&self) -> Vec<V> {
        let mut out = Vec::new();
        self.traverse(TraversalOrder::InOrder, |v| out.push(v.clone()));
        out
    }

    pub fn min(&self) -> Option<V> {
        let inner = self.inner.lock();
        let mut node = inner.nodes.get(&inner.root)?;
        while !node.leaf {
            node = inner.nodes.get(node.children.first()?)?;
        }
        node.values.first().cloned()
    }

    pub fn max(&self) -> Option<V> {
        let inner = self.inner.lock();
        let mut node = inner.nodes.get(&inner.root)?;
        while !node.leaf {
            node = inner.nodes.get(node.children.last()?)?;
        }
        node.values.last().cloned()
    }
}

impl<V, K: ?Sized> fmt::Debug for BTree<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree").field("metadata", &self.metadata()).finish()
    }
}
