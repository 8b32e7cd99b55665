//! Plain binary search tree (no balancing)

use super::bst::{self, Balance, MutationContext};
use super::facade::TreeKind;
use super::node::Link;
use super::ordered::OrderedTree;
use crate::Result;

/// No-op balancing strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbalanced;

impl Balance for Unbalanced {
    type Meta = ();

    const KIND: TreeKind = TreeKind::Binary;

    fn leaf_meta() {}

    // Height can equal length here, so no recursion per level.
    fn insert<V, K: ?Sized>(
        root: &mut Link<V, ()>,
        value: V,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Result<Option<V>> {
        bst::insert_descending(root, value, (), cx)
    }

    fn remove<V, K: ?Sized>(
        root: &mut Link<V, ()>,
        key: &K,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Option<V> {
        bst::remove_descending(root, key, cx)
    }
}

/// Binary search tree whose shape follows the insertion order
pub type BinaryTree<V, K = V> = OrderedTree<V, K, Unbalanced>;
