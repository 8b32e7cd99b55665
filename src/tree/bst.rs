//! Ordered search core shared by the binary variants
//!
//! Descent rule everywhere: `compare(key_of(node.value), key)` being
//! `Greater` goes left, `Less` goes right, `Equal` is a hit.
//!
//! Mutations only touch the tree once the target position is known, so an
//! error leaves the tree as it was. The balanced variants walk `&mut Link`
//! recursively and run the `Balance` hook on every node of the modified path
//! on the way back up; their depth is logarithmic. The plain variant has no
//! such bound and descends in a loop. Reads use explicit stacks.

use super::facade::TreeKind;
use super::node::{Link, Node, NodeAllocator, NodePointer};
use super::ordering::KeyOrdering;
use super::TraversalOrder;
use crate::config::DuplicatePolicy;
use crate::{Result, TreeError};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;

/// What an insert or remove needs besides the tree itself
pub struct MutationContext<'a, V, K: ?Sized> {
    pub(crate) ordering: &'a KeyOrdering<V, K>,
    pub(crate) allocator: &'a mut NodeAllocator,
    pub(crate) duplicates: DuplicatePolicy,
}

/// Balancing strategy of a binary variant
///
/// The provided insert and remove recurse down the tree and call
/// `rebalance` on the way back up. Strategies override `rebalance` (AVL) or
/// the whole insert/remove path (red-black, and the plain tree, which loops
/// instead) plus the metadata hooks used by parse and bulk build.
pub trait Balance: Sized + Send + Sync + 'static {
    /// Per-node balance metadata
    type Meta: Copy + fmt::Debug + Send + Sync + 'static;

    const KIND: TreeKind;

    /// Extra bytes per serialized record
    const TRAILER_SIZE: usize = 0;

    /// Metadata of a freshly allocated node
    fn leaf_meta() -> Self::Meta;

    /// Restore the invariant at `node` after one of its subtrees changed
    fn rebalance<V>(node: Box<Node<V, Self::Meta>>) -> Box<Node<V, Self::Meta>> {
        node
    }

    fn insert<V, K: ?Sized>(
        root: &mut Link<V, Self::Meta>,
        value: V,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Result<Option<V>> {
        insert::<V, K, Self>(root, value, cx)
    }

    fn remove<V, K: ?Sized>(
        root: &mut Link<V, Self::Meta>,
        key: &K,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Option<V> {
        remove::<V, K, Self>(root, key, cx)
    }

    /// Recompute metadata of a node whose children are final (parse, build)
    fn derive_meta<V>(_node: &mut Node<V, Self::Meta>) {}

    /// Last pass over a bulk-built tree of `len` nodes
    fn finish_build<V>(root: Link<V, Self::Meta>, _len: usize) -> Link<V, Self::Meta> {
        root
    }

    fn encode_meta(_meta: &Self::Meta, _trailer: &mut [u8]) {}

    fn decode_meta(_trailer: &[u8]) -> Result<Self::Meta> {
        Ok(Self::leaf_meta())
    }

    /// Deepest tree of `len` nodes the strategy can produce, if bounded
    ///
    /// Parse rejects deeper files before running `check`, which recurses.
    fn depth_limit(_len: u64) -> Option<usize> {
        None
    }

    /// Variant-specific structural invariant
    fn check<V>(_root: &Link<V, Self::Meta>) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Twice the bit length of `len + 1`; bounds both AVL and red-black depth
pub(crate) fn logarithmic_depth(len: u64) -> usize {
    let bits = u64::BITS - len.saturating_add(1).leading_zeros();
    2 * bits as usize
}

pub(crate) fn rebalance_link<V, B: Balance>(link: &mut Link<V, B::Meta>) {
    if let Some(node) = link.take() {
        *link = Some(B::rebalance(node));
    }
}

pub(crate) fn search<'n, V, K: ?Sized, M>(
    mut link: &'n Link<V, M>,
    key: &K,
    ordering: &KeyOrdering<V, K>,
) -> Option<&'n Node<V, M>> {
    while let Some(node) = link {
        match ordering.compare_key(&node.value, key) {
            Ordering::Greater => link = &node.left,
            Ordering::Less => link = &node.right,
            Ordering::Equal => return Some(node),
        }
    }
    None
}

pub(crate) fn insert<V, K: ?Sized, B: Balance>(
    link: &mut Link<V, B::Meta>,
    value: V,
    cx: &mut MutationContext<'_, V, K>,
) -> Result<Option<V>> {
    let node = match link {
        Some(node) => node,
        None => {
            let pointer = cx.allocator.allocate()?;
            *link = Some(Node::new(value, pointer, B::leaf_meta()));
            return Ok(None);
        }
    };

    let replaced = match cx.ordering.compare_values(&node.value, &value) {
        Ordering::Greater => insert::<V, K, B>(&mut node.left, value, cx)?,
        Ordering::Less => insert::<V, K, B>(&mut node.right, value, cx)?,
        Ordering::Equal => return replace_duplicate(&mut node.value, value, cx.duplicates),
    };

    rebalance_link::<V, B>(link);
    Ok(replaced)
}

fn replace_duplicate<V>(slot: &mut V, value: V, duplicates: DuplicatePolicy) -> Result<Option<V>> {
    match duplicates {
        DuplicatePolicy::Replace => Ok(Some(std::mem::replace(slot, value))),
        DuplicatePolicy::Reject => Err(TreeError::DuplicateKey),
    }
}

pub(crate) fn remove<V, K: ?Sized, B: Balance>(
    link: &mut Link<V, B::Meta>,
    key: &K,
    cx: &mut MutationContext<'_, V, K>,
) -> Option<V> {
    let node = link.as_mut()?;
    let removed = match cx.ordering.compare_key(&node.value, key) {
        Ordering::Greater => remove::<V, K, B>(&mut node.left, key, cx),
        Ordering::Less => remove::<V, K, B>(&mut node.right, key, cx),
        Ordering::Equal => unlink(link, cx.allocator, |right| {
            let subtree = right.take()?;
            let (rest, min) = detach_min::<V, B>(subtree);
            *right = rest;
            Some(min)
        }),
    };

    if removed.is_some() {
        rebalance_link::<V, B>(link);
    }
    removed
}

/// Insert without rebalancing, walking down in a loop
pub(crate) fn insert_descending<V, K: ?Sized, M>(
    root: &mut Link<V, M>,
    value: V,
    meta: M,
    cx: &mut MutationContext<'_, V, K>,
) -> Result<Option<V>> {
    let mut link = root;
    while let Some(node) = link {
        match cx.ordering.compare_values(&node.value, &value) {
            Ordering::Greater => link = &mut node.left,
            Ordering::Less => link = &mut node.right,
            Ordering::Equal => return replace_duplicate(&mut node.value, value, cx.duplicates),
        }
    }

    let pointer = cx.allocator.allocate()?;
    *link = Some(Node::new(value, pointer, meta));
    Ok(None)
}

/// Remove without rebalancing, walking down in a loop
pub(crate) fn remove_descending<V, K: ?Sized, M>(
    root: &mut Link<V, M>,
    key: &K,
    cx: &mut MutationContext<'_, V, K>,
) -> Option<V> {
    let mut link = root;
    loop {
        let order = cx.ordering.compare_key(&link.as_deref()?.value, key);
        if order == Ordering::Equal {
            return unlink(link, cx.allocator, detach_leftmost);
        }
        if let Some(node) = link {
            link = if order == Ordering::Greater { &mut node.left } else { &mut node.right };
        }
    }
}

/// Remove the node at `link`, returning its value
///
/// With two children the node stays in place (keeping its pointer) and takes
/// over its in-order successor's value. `take_successor` detaches the
/// successor from the right subtree.
fn unlink<V, M>(
    link: &mut Link<V, M>,
    allocator: &mut NodeAllocator,
    take_successor: impl FnOnce(&mut Link<V, M>) -> Link<V, M>,
) -> Option<V> {
    let mut node = link.take()?;

    let removed = match (node.left.take(), node.right.take()) {
        (None, None) => node.value,
        (Some(child), None) | (None, Some(child)) => {
            *link = Some(child);
            node.value
        }
        (left, mut right) => {
            let successor = take_successor(&mut right);
            node.left = left;
            node.right = right;
            let successor = match successor {
                Some(successor) => successor,
                None => {
                    *link = Some(node);
                    return None;
                }
            };
            let removed = std::mem::replace(&mut node.value, successor.value);
            *link = Some(node);
            removed
        }
    };

    allocator.release();
    Some(removed)
}

/// Split off the leftmost node of a subtree, rebalancing on the way up
fn detach_min<V, B: Balance>(
    mut node: Box<Node<V, B::Meta>>,
) -> (Link<V, B::Meta>, Box<Node<V, B::Meta>>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = detach_min::<V, B>(left);
            node.left = rest;
            (Some(B::rebalance(node)), min)
        }
    }
}

/// Split off the leftmost node below `link` without rebalancing
fn detach_leftmost<V, M>(link: &mut Link<V, M>) -> Link<V, M> {
    let mut steps = 0usize;
    let mut cursor = link.as_deref().and_then(|node| node.left.as_deref());
    while let Some(node) = cursor {
        steps += 1;
        cursor = node.left.as_deref();
    }

    let mut link = link;
    for _ in 0..steps {
        if let Some(node) = link {
            link = &mut node.left;
        }
    }
    let mut min = link.take()?;
    *link = min.right.take();
    Some(min)
}

/// Visit nodes in `order` with an explicit stack; stops at the first error
fn walk<'a, V, M, E>(
    link: &'a Link<V, M>,
    order: TraversalOrder,
    mut visit: impl FnMut(&'a Node<V, M>) -> std::result::Result<(), E>,
) -> std::result::Result<(), E> {
    // `true` marks a node whose children are already on the stack.
    let mut stack: Vec<(&'a Node<V, M>, bool)> = link.as_deref().map(|node| (node, false)).into_iter().collect();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            visit(node)?;
            continue;
        }
        let left = node.left.as_deref().map(|child| (child, false));
        let right = node.right.as_deref().map(|child| (child, false));
        match order {
            TraversalOrder::PreOrder => {
                visit(node)?;
                stack.extend(right);
                stack.extend(left);
            }
            TraversalOrder::InOrder => {
                stack.extend(right);
                stack.push((node, true));
                stack.extend(left);
            }
            TraversalOrder::PostOrder => {
                stack.push((node, true));
                stack.extend(right);
                stack.extend(left);
            }
        }
    }
    Ok(())
}

pub(crate) fn traverse<V, M>(link: &Link<V, M>, order: TraversalOrder, visit: &mut dyn FnMut(&V)) {
    let _ = walk(link, order, |node| {
        visit(&node.value);
        Ok::<(), Infallible>(())
    });
}

/// Nodes on the longest root-to-leaf path (empty tree: 0)
pub(crate) fn depth<V, M>(link: &Link<V, M>) -> usize {
    let mut deepest = 0;
    let mut stack: Vec<(&Node<V, M>, usize)> = link.as_deref().map(|node| (node, 1)).into_iter().collect();
    while let Some((node, level)) = stack.pop() {
        deepest = deepest.max(level);
        for child in [node.left.as_deref(), node.right.as_deref()].into_iter().flatten() {
            stack.push((child, level + 1));
        }
    }
    deepest
}

pub(crate) fn leftmost<V, M>(link: &Link<V, M>) -> Option<&V> {
    let mut node = link.as_deref()?;
    while let Some(left) = node.left.as_deref() {
        node = left;
    }
    Some(&node.value)
}

pub(crate) fn rightmost<V, M>(link: &Link<V, M>) -> Option<&V> {
    let mut node = link.as_deref()?;
    while let Some(right) = node.right.as_deref() {
        node = right;
    }
    Some(&node.value)
}

/// Node pointers in pre-order
pub(crate) fn collect_pointers<V, M>(link: &Link<V, M>, out: &mut Vec<NodePointer>) {
    let _ = walk(link, TraversalOrder::PreOrder, |node| {
        out.push(node.node_pointer);
        Ok::<(), Infallible>(())
    });
}

/// In-order keys strictly ascending
pub(crate) fn check_order<V, K: ?Sized, M>(
    link: &Link<V, M>,
    ordering: &KeyOrdering<V, K>,
) -> std::result::Result<(), String> {
    let mut prev: Option<&V> = None;
    walk(link, TraversalOrder::InOrder, |node| {
        if let Some(before) = prev {
            if ordering.compare_values(before, &node.value) != Ordering::Less {
                return Err(format!("node {} is out of order", node.node_pointer));
            }
        }
        prev = Some(&node.value);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::binary::Unbalanced;

    fn build(values: &[u32], allocator: &mut NodeAllocator) -> Link<u32, ()> {
        let ordering = KeyOrdering::natural();
        let mut root = None;
        let mut cx = MutationContext {
            ordering: &ordering,
            allocator,
            duplicates: DuplicatePolicy::Replace,
        };
        for v in values {
            insert::<u32, u32, Unbalanced>(&mut root, *v, &mut cx).unwrap();
        }
        root
    }

    fn in_order(root: &Link<u32, ()>) -> Vec<u32> {
        let mut out = Vec::new();
        traverse(root, TraversalOrder::InOrder, &mut |v| out.push(*v));
        out
    }

    #[test]
    fn test_insert_and_search() {
        let mut allocator = NodeAllocator::new();
        let root = build(&[8, 4, 12, 2, 6], &mut allocator);
        let ordering = KeyOrdering::natural();

        assert_eq!(search(&root, &6, &ordering).map(|n| n.value), Some(6));
        assert!(search(&root, &7, &ordering).is_none());
        assert_eq!(allocator.node_count(), 5);
        assert_eq!(depth(&root), 3);
    }

    #[test]
    fn test_traversal_orders() {
        let mut allocator = NodeAllocator::new();
        let root = build(&[8, 4, 12], &mut allocator);

        let mut pre = Vec::new();
        traverse(&root, TraversalOrder::PreOrder, &mut |v| pre.push(*v));
        let mut post = Vec::new();
        traverse(&root, TraversalOrder::PostOrder, &mut |v| post.push(*v));

        assert_eq!(pre, vec![8, 4, 12]);
        assert_eq!(in_order(&root), vec![4, 8, 12]);
        assert_eq!(post, vec![4, 12, 8]);
    }

    #[test]
    fn test_remove_two_children_keeps_pointer() {
        let mut allocator = NodeAllocator::new();
        let mut root = build(&[8, 4, 12, 10, 14], &mut allocator);
        let ordering = KeyOrdering::natural();
        let root_pointer = root.as_ref().map(|n| n.node_pointer);

        let mut cx = MutationContext {
            ordering: &ordering,
            allocator: &mut allocator,
            duplicates: DuplicatePolicy::Replace,
        };
        assert_eq!(remove::<u32, u32, Unbalanced>(&mut root, &8, &mut cx), Some(8));
        assert_eq!(root.as_ref().map(|n| n.value), Some(10));
        assert_eq!(root.as_ref().map(|n| n.node_pointer), root_pointer);
        assert_eq!(in_order(&root), vec![4, 10, 12, 14]);
        assert_eq!(allocator.node_count(), 4);
    }

    #[test]
    fn test_check_order_detects_swap() {
        let mut allocator = NodeAllocator::new();
        let mut root = build(&[8, 4, 12], &mut allocator);
        let ordering = KeyOrdering::natural();
        assert!(check_order(&root, &ordering).is_ok());

        if let Some(node) = root.as_mut() {
            node.value = 2;
        }
        assert!(check_order(&root, &ordering).is_err());
    }

    #[test]
    fn test_extremes() {
        let mut allocator = NodeAllocator::new();
        let root = build(&[8, 4, 12, 2, 14], &mut allocator);
        assert_eq!(leftmost(&root), Some(&2));
        assert_eq!(rightmost(&root), Some(&14));
    }
}
