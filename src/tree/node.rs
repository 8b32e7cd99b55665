//! Binary tree nodes and the node pointer allocator

use crate::{Result, TreeError};

/// Stable identity of a node, and its slot in a serialized file
pub type NodePointer = u64;

/// Never assigned to a node; stands for "no child" on disk
pub const NULL_POINTER: NodePointer = 0;

pub type Link<V, M> = Option<Box<Node<V, M>>>;

/// Node of the binary variants
///
/// `M` is the per-variant balance metadata: `()` for the plain tree, the
/// subtree height for AVL, the link color for red-black.
#[derive(Debug)]
pub struct Node<V, M> {
    pub(crate) value: V,
    pub(crate) left: Link<V, M>,
    pub(crate) right: Link<V, M>,
    pub(crate) node_pointer: NodePointer,
    pub(crate) meta: M,
}

impl<V, M> Node<V, M> {
    pub(crate) fn new(value: V, node_pointer: NodePointer, meta: M) -> Box<Self> {
        Box::new(Self { value, left: None, right: None, node_pointer, meta })
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn node_pointer(&self) -> NodePointer {
        self.node_pointer
    }

    pub fn left(&self) -> Option<&Node<V, M>> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&Node<V, M>> {
        self.right.as_deref()
    }

    pub fn meta(&self) -> &M {
        &self.meta
    }
}

/// Drop a subtree one node at a time
///
/// The derived drop of `Link` recurses once per level, and a plain binary
/// tree can be as deep as it is long.
pub(crate) fn dismantle<V, M>(link: Link<V, M>) {
    let mut pending: Vec<Box<Node<V, M>>> = link.into_iter().collect();
    while let Some(mut node) = pending.pop() {
        pending.extend(node.left.take());
        pending.extend(node.right.take());
    }
}

/// Hands out node pointers and counts live nodes
///
/// Pointers start at 1 and only grow; a removed node leaves a gap that is
/// never filled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAllocator {
    next_pointer: NodePointer,
    node_count: u64,
}

impl Default for NodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeAllocator {
    pub fn new() -> Self {
        Self { next_pointer: 1, node_count: 0 }
    }

    /// Continue after a parsed file whose highest pointer is `max_pointer`
    pub fn resume(max_pointer: NodePointer, node_count: u64) -> Result<Self> {
        let next_pointer = max_pointer.checked_add(1).ok_or_else(|| {
            TreeError::ResourceExhausted("node pointer space exhausted".into())
        })?;
        Ok(Self { next_pointer, node_count })
    }

    pub fn allocate(&mut self) -> Result<NodePointer> {
        let pointer = self.next_pointer;
        self.next_pointer = pointer.checked_add(1).ok_or_else(|| {
            TreeError::ResourceExhausted("node pointer space exhausted".into())
        })?;
        self.node_count += 1;
        Ok(pointer)
    }

    /// One node left the tree
    pub fn release(&mut self) {
        debug_assert!(self.node_count > 0);
        self.node_count = self.node_count.saturating_sub(1);
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn next_pointer(&self) -> NodePointer {
        self.next_pointer
    }

    /// Forget every node; pointers still do not restart
    pub(crate) fn reset_count(&mut self) {
        self.node_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointers_are_monotonic() {
        let mut allocator = NodeAllocator::new();
        assert_eq!(allocator.allocate().unwrap(), 1);
        assert_eq!(allocator.allocate().unwrap(), 2);
        allocator.release();
        assert_eq!(allocator.allocate().unwrap(), 3);
        assert_eq!(allocator.node_count(), 2);
        assert_eq!(allocator.next_pointer(), 4);
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = NodeAllocator { next_pointer: u64::MAX, node_count: 0 };
        assert!(matches!(allocator.allocate(), Err(TreeError::ResourceExhausted(_))));
        assert_eq!(allocator.node_count(), 0);
        assert!(NodeAllocator::resume(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_dismantle_deep_chain() {
        let mut root: Link<u32, ()> = None;
        for v in 0..200_000u32 {
            let mut node = Node::new(v, u64::from(v) + 1, ());
            node.right = root;
            root = Some(node);
        }
        dismantle(root);
    }

    #[test]
    fn test_resume() {
        let mut allocator = NodeAllocator::resume(9, 4).unwrap();
        assert_eq!(allocator.node_count(), 4);
        assert_eq!(allocator.allocate().unwrap(), 10);
    }
}
