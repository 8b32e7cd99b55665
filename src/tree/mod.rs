//! Ordered key/value trees
//!
//! Binary variants (`BinaryTree`, `AvlTree`, `RedBlackTree`) share one
//! search core and differ only in their `Balance` strategy. `BTree` is a
//! multiway tree over a node arena. `Tree` picks any of them at runtime
//! behind the `SearchTree` trait.

pub mod avl;
pub mod binary;
pub mod btree;
pub mod bst;
pub mod facade;
pub mod node;
pub mod ordered;
pub mod ordering;
pub mod red_black;

mod balanced;
mod persist;

use serde::Serialize;

pub use self::avl::{Avl, AvlTree};
pub use self::binary::{BinaryTree, Unbalanced};
pub use self::btree::BTree;
pub use self::bst::{Balance, MutationContext};
pub use self::facade::{SearchTree, Tree, TreeKind};
pub use self::node::{Node, NodeAllocator, NodePointer, NULL_POINTER};
pub use self::ordered::OrderedTree;
pub use self::ordering::KeyOrdering;
pub use self::red_black::{Color, RedBlack, RedBlackTree};

/// Visit order of `traverse`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalOrder {
    /// Node before its subtrees
    PreOrder,
    /// Ascending key order
    InOrder,
    /// Subtrees before their node
    PostOrder,
}

/// Snapshot of a tree's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeMetadata {
    pub kind: TreeKind,

    /// Live nodes
    pub node_count: u64,

    /// Record size of the last serialize or parse, 0 if neither happened
    pub node_size: u64,

    /// Pointer the next allocated node will get
    pub next_node_pointer: NodePointer,

    /// Binary variants: nodes on the longest root-to-leaf path.
    /// B-tree: edges from the root to the leaves.
    pub height: usize,

    /// Values stored (equal to `node_count` for binary variants)
    pub key_quantity: u64,

    /// Pointer of the root node, `NULL_POINTER` when empty
    pub root_address: NodePointer,

    /// Minimum degree, B-tree only
    pub degree: Option<usize>,
}
