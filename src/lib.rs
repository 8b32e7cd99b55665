//! Treestore
//!
//! Ordered key/value trees with a fixed-record file format.
//!
//! ## Variants
//! - `BinaryTree`: plain binary search tree, no balancing
//! - `AvlTree`: height-balanced, heights kept per node
//! - `RedBlackTree`: left-leaning red-black tree
//! - `BTree`: multiway tree of minimum degree `t`
//!
//! `Tree` selects one of them at runtime by `TreeKind`.
//!
//! ## Layout
//! - tree: node allocator, key ordering, the four variants and the façade
//! - storage: payload codecs, file headers, record reader/writer
//! - config: duplicate policy, B-tree degree, sync mode

pub mod config;
pub mod storage;
pub mod tree;

mod error;

pub use config::{DuplicatePolicy, SyncMode, TreeConfig, MIN_DEGREE};
pub use error::{Result, TreeError};

pub use storage::{BincodeCodec, FixedCodec, FixedWidth, FnCodec, PayloadCodec};
pub use tree::{
    AvlTree, BTree, BinaryTree, KeyOrdering, NodePointer, OrderedTree, RedBlackTree, SearchTree,
    TraversalOrder, Tree, TreeKind, TreeMetadata, NULL_POINTER,
};
