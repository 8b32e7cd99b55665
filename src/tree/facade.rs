//! Runtime choice of tree variant
//!
//! `SearchTree` is the object-safe surface every variant implements; `Tree`
//! owns one boxed variant and forwards to it.

use super::btree::BTree;
use super::bst::Balance;
use super::ordered::OrderedTree;
use super::ordering::KeyOrdering;
use super::{AvlTree, BinaryTree, RedBlackTree, TraversalOrder, TreeMetadata};
use crate::config::TreeConfig;
use crate::storage::PayloadCodec;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tree variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Binary,
    Avl,
    RedBlack,
    BTree,
}

impl TreeKind {
    /// Lookups dominate
    pub const FREQUENT_ACCESS: TreeKind = TreeKind::Avl;
    /// Inserts and removes dominate
    pub const FREQUENT_MUTATION: TreeKind = TreeKind::RedBlack;
    /// Wide nodes, shallow tree
    pub const LARGE_DATA: TreeKind = TreeKind::BTree;
    pub const NO_BALANCING: TreeKind = TreeKind::Binary;

    pub fn name(&self) -> &'static str {
        match self {
            TreeKind::Binary => "binary",
            TreeKind::Avl => "avl",
            TreeKind::RedBlack => "red-black",
            TreeKind::BTree => "btree",
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations common to every tree variant
pub trait SearchTree<V, K: ?Sized>: Send + Sync {
    fn kind(&self) -> TreeKind;

    /// Insert `value`; returns the displaced value under `DuplicatePolicy::Replace`
    fn insert(&self, value: V) -> Result<Option<V>>;

    fn search(&self, key: &K) -> Option<V>;

    fn remove(&self, key: &K) -> Result<Option<V>>;

    fn traverse(&self, order: TraversalOrder, visit: &mut dyn FnMut(&V));

    fn traverse_preorder(&self, visit: &mut dyn FnMut(&V)) {
        self.traverse(TraversalOrder::PreOrder, visit)
    }

    fn traverse_inorder(&self, visit: &mut dyn FnMut(&V)) {
        self.traverse(TraversalOrder::InOrder, visit)
    }

    fn traverse_postorder(&self, visit: &mut dyn FnMut(&V)) {
        self.traverse(TraversalOrder::PostOrder, visit)
    }

    fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn metadata(&self) -> TreeMetadata;
}

impl<V, K, B> SearchTree<V, K> for OrderedTree<V, K, B>
where
    V: Clone + Send,
    K: ?Sized,
    B: Balance,
{
    fn kind(&self) -> TreeKind {
        B::KIND
    }

    fn insert(&self, value: V) -> Result<Option<V>> {
        OrderedTree::insert(self, value)
    }

    fn search(&self, key: &K) -> Option<V> {
        OrderedTree::search(self, key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(OrderedTree::remove(self, key))
    }

    fn traverse(&self, order: TraversalOrder, visit: &mut dyn FnMut(&V)) {
        OrderedTree::traverse(self, order, visit)
    }

    fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()> {
        OrderedTree::serialize(self, path, codec)
    }

    fn len(&self) -> u64 {
        OrderedTree::len(self)
    }

    fn metadata(&self) -> TreeMetadata {
        OrderedTree::metadata(self)
    }
}

impl<V, K> SearchTree<V, K> for BTree<V, K>
where
    V: Clone + Send,
    K: ?Sized,
{
    fn kind(&self) -> TreeKind {
        TreeKind::BTree
    }

    fn insert(&self, value: V) -> Result<Option<V>> {
        BTree::insert(self, value)
    }

    fn search(&self, key: &K) -> Option<V> {
        BTree::search(self, key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        BTree::remove(self, key)
    }

    fn traverse(&self, order: TraversalOrder, visit: &mut dyn FnMut(&V)) {
        BTree::traverse(self, order, visit)
    }

    fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()> {
        BTree::serialize(self, path, codec)
    }

    fn len(&self) -> u64 {
        BTree::len(self)
    }

    fn metadata(&self) -> TreeMetadata {
        BTree::metadata(self)
    }
}

/// A tree whose variant is chosen at construction
pub struct Tree<V, K: ?Sized = V> {
    kind: TreeKind,
    inner: Box<dyn SearchTree<V, K>>,
}

impl<V, K> Tree<V, K>
where
    V: Clone + Send + 'static,
    K: ?Sized + 'static,
{
    pub fn new(kind: TreeKind, ordering: KeyOrdering<V, K>, config: TreeConfig) -> Result<Self> {
        let inner: Box<dyn SearchTree<V, K>> = match kind {
            TreeKind::Binary => Box::new(BinaryTree::<V, K>::new(ordering, config)?),
            TreeKind::Avl => Box::new(AvlTree::<V, K>::new(ordering, config)?),
            TreeKind::RedBlack => Box::new(RedBlackTree::<V, K>::new(ordering, config)?),
            TreeKind::BTree => Box::new(BTree::<V, K>::new(ordering, config)?),
        };
        Ok(Self { kind, inner })
    }

    /// Bulk-load strictly ascending values
    ///
    /// Binary variants get a height-balanced shape; the B-tree inserts them
    /// one by one.
    pub fn from_sorted(
        kind: TreeKind,
        values: Vec<V>,
        ordering: KeyOrdering<V, K>,
        config: TreeConfig,
    ) -> Result<Self> {
        let inner: Box<dyn SearchTree<V, K>> = match kind {
            TreeKind::Binary => Box::new(BinaryTree::<V, K>::from_sorted(values, ordering, config)?),
            TreeKind::Avl => Box::new(AvlTree::<V, K>::from_sorted(values, ordering, config)?),
            TreeKind::RedBlack => Box::new(RedBlackTree::<V, K>::from_sorted(values, ordering, config)?),
            TreeKind::BTree => Box::new(BTree::<V, K>::from_sorted(values, ordering, config)?),
        };
        Ok(Self { kind, inner })
    }

    /// Load a file written by a tree of the same `kind`
    pub fn parse(
        kind: TreeKind,
        path: &Path,
        codec: &dyn PayloadCodec<V>,
        ordering: KeyOrdering<V, K>,
        config: TreeConfig,
    ) -> Result<Self> {
        let inner: Box<dyn SearchTree<V, K>> = match kind {
            TreeKind::Binary => Box::new(BinaryTree::<V, K>::parse(path, codec, ordering, config)?),
            TreeKind::Avl => Box::new(AvlTree::<V, K>::parse(path, codec, ordering, config)?),
            TreeKind::RedBlack => Box::new(RedBlackTree::<V, K>::parse(path, codec, ordering, config)?),
            TreeKind::BTree => Box::new(BTree::<V, K>::parse(path, codec, ordering, config)?),
        };
        Ok(Self { kind, inner })
    }
}

impl<V, K: ?Sized> SearchTree<V, K> for Tree<V, K> {
    fn kind(&self) -> TreeKind {
        self.kind
    }

    fn insert(&self, value: V) -> Result<Option<V>> {
        self.inner.insert(value)
    }

    fn search(&self, key: &K) -> Option<V> {
        self.inner.search(key)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.inner.remove(key)
    }

    fn traverse(&self, order: TraversalOrder, visit: &mut dyn FnMut(&V)) {
        self.inner.traverse(order, visit)
    }

    fn serialize(&self, path: &Path, codec: &dyn PayloadCodec<V>) -> Result<()> {
        self.inner.serialize(path, codec)
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn metadata(&self) -> TreeMetadata {
        self.inner.metadata()
    }
}

impl<V, K: ?Sized> fmt::Debug for Tree<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("kind", &self.kind)
            .field("metadata", &self.inner.metadata())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FixedCodec;
    use tempfile::TempDir;

    const KINDS: [TreeKind; 4] = [TreeKind::Binary, TreeKind::Avl, TreeKind::RedBlack, TreeKind::BTree];

    fn collect(tree: &Tree<u64>, order: TraversalOrder) -> Vec<u64> {
        let mut out = Vec::new();
        tree.traverse(order, &mut |v| out.push(*v));
        out
    }

    #[test]
    fn test_every_kind_behaves_as_ordered_map() {
        for kind in KINDS {
            let tree = Tree::new(kind, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
            for v in [50u64, 20, 80, 10, 30, 70, 90, 60] {
                tree.insert(v).unwrap();
            }

            assert_eq!(tree.kind(), kind);
            assert_eq!(tree.len(), 8, "{}", kind);
            assert_eq!(tree.search(&30), Some(30));
            assert_eq!(tree.search(&31), None);
            assert_eq!(tree.remove(&20).unwrap(), Some(20));
            assert_eq!(tree.remove(&20).unwrap(), None);
            assert_eq!(collect(&tree, TraversalOrder::InOrder), vec![10, 30, 50, 60, 70, 80, 90]);
        }
    }

    #[test]
    fn test_every_kind_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let codec = FixedCodec::<u64>::new();

        for kind in KINDS {
            let path = temp_dir.path().join(format!("{}.tree", kind));
            let tree = Tree::from_sorted(kind, (1..=40).collect(), KeyOrdering::natural(), TreeConfig::for_testing())
                .unwrap();
            tree.remove(&17).unwrap();
            tree.serialize(&path, &codec).unwrap();

            let parsed = Tree::parse(kind, &path, &codec, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
            assert_eq!(parsed.len(), 39, "{}", kind);
            assert_eq!(
                collect(&parsed, TraversalOrder::PreOrder),
                collect(&tree, TraversalOrder::PreOrder),
                "{}",
                kind
            );
        }
    }

    #[test]
    fn test_provided_traversals() {
        let tree = Tree::new(TreeKind::Binary, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
        for v in [2u64, 1, 3] {
            tree.insert(v).unwrap();
        }

        let mut pre = Vec::new();
        tree.traverse_preorder(&mut |v| pre.push(*v));
        let mut post = Vec::new();
        tree.traverse_postorder(&mut |v| post.push(*v));
        let mut sorted = Vec::new();
        tree.traverse_inorder(&mut |v| sorted.push(*v));

        assert_eq!(pre, vec![2, 1, 3]);
        assert_eq!(post, vec![1, 3, 2]);
        assert_eq!(sorted, vec![1, 2, 3]);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TreeKind::FREQUENT_ACCESS, TreeKind::Avl);
        assert_eq!(TreeKind::LARGE_DATA.to_string(), "btree");
        assert_eq!(serde_json::to_string(&TreeKind::RedBlack).unwrap(), "\"RedBlack\"");
    }

    mod proptest_round_trip {
        use super::*;
        use crate::tree::avl::Avl;
        use crate::tree::binary::Unbalanced;
        use crate::tree::bst::Balance;
        use crate::tree::red_black::RedBlack;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(u64),
            Remove(u64),
        }

        fn op_sequence() -> impl Strategy<Value = Vec<Op>> {
            let op = prop_oneof![
                3 => (0u64..500).prop_map(Op::Insert),
                1 => (0u64..500).prop_map(Op::Remove),
            ];
            prop::collection::vec(op, 0..300)
        }

        fn ordered<B: Balance>(ops: &[Op], dir: &TempDir) -> std::result::Result<(), TestCaseError> {
            let codec = FixedCodec::<u64>::new();
            let tree = OrderedTree::<u64, u64, B>::new(KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
            for op in ops {
                match op {
                    Op::Insert(v) => {
                        tree.insert(*v).unwrap();
                    }
                    Op::Remove(v) => {
                        tree.remove(v);
                    }
                }
            }

            let path = dir.path().join(format!("{}.tree", B::KIND));
            tree.serialize(&path, &codec).unwrap();
            let parsed =
                OrderedTree::<u64, u64, B>::parse(&path, &codec, KeyOrdering::natural(), TreeConfig::for_testing())
                    .unwrap();

            prop_assert_eq!(parsed.to_vec(), tree.to_vec());
            prop_assert_eq!(parsed.node_pointers(), tree.node_pointers());
            prop_assert_eq!(parsed.len(), tree.len());
            prop_assert!(parsed.check_invariants().is_ok());
            Ok(())
        }

        fn btree(ops: &[Op], degree: usize, dir: &TempDir) -> std::result::Result<(), TestCaseError> {
            let codec = FixedCodec::<u64>::new();
            let config = TreeConfig::for_testing().with_degree(degree);
            let tree = BTree::<u64>::new(KeyOrdering::natural(), config.clone()).unwrap();
            for op in ops {
                match op {
                    Op::Insert(v) => {
                        tree.insert(*v).unwrap();
                    }
                    Op::Remove(v) => {
                        tree.remove(v).unwrap();
                    }
                }
            }

            let path = dir.path().join("btree.tree");
            tree.serialize(&path, &codec).unwrap();
            let parsed = BTree::<u64>::parse(&path, &codec, KeyOrdering::natural(), config).unwrap();

            prop_assert_eq!(parsed.to_vec(), tree.to_vec());
            prop_assert_eq!(parsed.node_pointers(), tree.node_pointers());
            prop_assert_eq!(parsed.len(), tree.len());
            prop_assert!(parsed.check_invariants().is_ok());
            Ok(())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_serialize_parse_preserves_every_kind(ops in op_sequence(), degree in 2usize..6) {
                let dir = TempDir::new().unwrap();
                ordered::<Unbalanced>(&ops, &dir)?;
                ordered::<Avl>(&ops, &dir)?;
                ordered::<RedBlack>(&ops, &dir)?;
                btree(&ops, degree, &dir)?;
            }
        }
    }
}
