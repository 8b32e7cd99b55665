//! Mutex-guarded binary tree shared by the plain, AVL and red-black variants

use super::balanced::build_balanced;
use super::bst::{self, Balance, MutationContext};
use super::node::{dismantle, Link, NodeAllocator, NodePointer, NULL_POINTER};
use super::ordering::KeyOrdering;
use super::persist;
use super::{TraversalOrder, TreeMetadata};
use crate::config::TreeConfig;
use crate::storage::PayloadCodec;
use crate::{Result, TreeError};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;

struct Inner<V, M> {
    root: Link<V, M>,
    allocator: NodeAllocator,
    /// Record size of the last serialize or parse (0 before either)
    node_size: u64,
}

impl<V, M> Drop for Inner<V, M> {
    fn drop(&mut self) {
        dismantle(self.root.take());
    }
}

/// Binary search tree balanced by strategy `B`
///
/// Every operation holds the tree's mutex for its whole duration. Visitors
/// passed to `traverse` and `search_with` run under that lock and must not
/// call back into the same tree.
pub struct OrderedTree<V, K: ?Sized, B: Balance> {
    inner: Mutex<Inner<V, B::Meta>>,
    ordering: KeyOrdering<V, K>,
    config: TreeConfig,
}

impl<V, K: ?Sized, B: Balance> OrderedTree<V, K, B> {
    pub fn new(ordering: KeyOrdering<V, K>, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_state(None, NodeAllocator::new(), 0, ordering, config))
    }

    fn with_state(
        root: Link<V, B::Meta>,
        allocator: NodeAllocator,
        node_size: u64,
        ordering: KeyOrdering<V, K>,
        config: TreeConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner { root, allocator, node_size }),
            ordering,
            config,
        }
    }

    /// Build a balanced tree from strictly ascending values
    pub fn from_sorted(values: Vec<V>, ordering: KeyOrdering<V, K>, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let mut allocator = NodeAllocator::new();
        let root = build_balanced::<V, K, B>(values, &ordering, &mut allocator)?;
        Ok(Self::with_state(root, allocator, 0, ordering, config))
    }

    /// Load a tree written by `serialize`
    ///
    /// The file is fully validated (node count, pointer bounds, key order,
    /// balance invariants) before a tree is returned.
    pub fn parse(
        path: &Path,
        codec: &dyn PayloadCodec<V>,
        ordering: KeyOrdering<V, K>,
        config: TreeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let parsed = persist::parse::<V, K, B>(path, codec, &ordering)?;
        Ok(Self::with_state(parsed.root, parsed.allocator, parsed.record_size, ordering, config))
    }

    pub fn ordering(&self) -> &KeyOrdering<V, K> {
        &self.ordering
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Insert `value`; with `DuplicatePolicy::Replace` the displaced value is returned
    pub fn insert(&self, value: V) -> Result<Option<V>> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let mut cx = MutationContext {
            ordering: &self.ordering,
            allocator: &mut inner.allocator,
            duplicates: self.config.duplicates,
        };
        B::insert(&mut inner.root, value, &mut cx)
    }

    /// Remove the value stored under `key`
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let mut cx = MutationContext {
            ordering: &self.ordering,
            allocator: &mut inner.allocator,
            duplicates: self.config.duplicates,
        };
        B::remove(&mut inner.root, key, &mut cx)
    }

    /// Lend the value stored under `key` to `f`
    pub fn search_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let inner = self.inner.lock();
        bst::search(&inner.root, key, &self.ordering).map(|node| f(&node.value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.search_with(key, |_| ()).is_some()
    }

    pub fn traverse(&self, order: TraversalOrder, mut visit: impl FnMut(&V)) {
        let inner = self.inner.lock();
        bst::traverse(&inner.root, order, &mut visit);
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().allocator.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().root.is_none()
    }

    /// Nodes on the longest root-to-leaf path
    pub fn height(&self) -> usize {
        bst::depth(&self.inner.lock().root)
    }

    /// Drop every node; node pointers keep counting from where they were
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        dismantle(inner.root.take());
        inner.allocator.reset_count();
    }

    pub fn metadata(&self) -> TreeMetadata {
        let inner = self.inner.lock();
        TreeMetadata {
            kind: B::KIND,
            node_count: inner.allocator.node_count(),
            node_size: inner.node_size,
            next_node_pointer: inner.allocator.next_pointer(),
            height: bst::depth(&inner.root),
            key_quantity: inner.allocator.node_count(),
            root_address: inner.root.as_ref().map_or(NULL_POINTER, |node| node.node_pointer),
            degree: None,
        }
    }

    /// Node pointers in pre-order
    pub fn node_pointers(&self) -> Vec<NodePointer> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        bst::collect_pointers(&inner.root, &mut out);
        out
    }

    /// Verify key order and the strategy's balance invariant
    pub fn check_invariants(&self) -> Result<()> {
        let inner = self.inner.lock();
        bst::check_order(&inner.root, &self.ordering)
            .and_then(|_| B::check(&inner.root))
            .map_err(TreeError::Corruption)
    }

    /// Write the tree to `path` in fixed-size records
    ///
    /// The file is replaced atomically; on error the previous file is kept.
    pub fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()> {
        let mut inner = self.inner.lock();
        persist::serialize::<V, B>(
            &inner.root,
            inner.allocator.node_count(),
            path,
            codec,
            self.config.sync,
        )?;
        inner.node_size = persist::record_size::<V, B>(codec);
        Ok(())
    }
}

impl<V: Clone, K: ?Sized, B: Balance> OrderedTree<V, K, B> {
    pub fn search(&self, key: &K) -> Option<V> {
        self.search_with(key, V::clone)
    }

    pub fn min(&self) -> Option<V> {
        bst::leftmost(&self.inner.lock().root).cloned()
    }

    pub fn max(&self) -> Option<V> {
        bst::rightmost(&self.inner.lock().root).cloned()
    }

    /// All values in key order
    pub fn to_vec(&self) -> Vec<V> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.traverse(TraversalOrder::InOrder, |v| out.push(v.clone()));
        out
    }
}

impl<V, K: ?Sized, B: Balance> fmt::Debug for OrderedTree<V, K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedTree").field("metadata", &self.metadata()).finish()
    }
}
