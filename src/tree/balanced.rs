//! Balanced bulk construction from sorted input
//!
//! The middle element of each range becomes the subtree root, so sibling
//! subtree sizes differ by at most one and every level but the last is full.

use super::bst::Balance;
use super::node::{Link, Node, NodeAllocator};
use super::ordering::KeyOrdering;
use crate::{Result, TreeError};
use std::cmp::Ordering;

/// Build a tree from strictly ascending `values`
///
/// Pointers are handed out in pre-order (each subtree root before its
/// children). Returns `InvalidArgument` without allocating anything if the
/// input is not strictly ascending under `ordering`.
pub(crate) fn build_balanced<V, K: ?Sized, B: Balance>(
    values: Vec<V>,
    ordering: &KeyOrdering<V, K>,
    allocator: &mut NodeAllocator,
) -> Result<Link<V, B::Meta>> {
    if let Some(i) = values
        .windows(2)
        .position(|pair| ordering.compare_values(&pair[0], &pair[1]) != Ordering::Less)
    {
        return Err(TreeError::InvalidArgument(format!(
            "bulk input is not strictly ascending at index {}",
            i + 1
        )));
    }

    let len = values.len();
    let mut slots: Vec<Option<V>> = values.into_iter().map(Some).collect();
    let root = build::<V, B>(&mut slots, allocator)?;
    Ok(B::finish_build(root, len))
}

fn take_slot<V>(slots: &mut [Option<V>], index: usize) -> Result<V> {
    slots
        .get_mut(index)
        .and_then(Option::take)
        .ok_or_else(|| TreeError::InvalidArgument(format!("bulk slot {} consumed twice", index)))
}

fn build<V, B: Balance>(
    slots: &mut [Option<V>],
    allocator: &mut NodeAllocator,
) -> Result<Link<V, B::Meta>> {
    let mut node = match slots.len() {
        0 => return Ok(None),
        1 => Node::new(take_slot(slots, 0)?, allocator.allocate()?, B::leaf_meta()),
        2 => {
            // Larger value on top, smaller one as its left child.
            let mut node = Node::new(take_slot(slots, 1)?, allocator.allocate()?, B::leaf_meta());
            node.left = Some(Node::new(take_slot(slots, 0)?, allocator.allocate()?, B::leaf_meta()));
            if let Some(left) = node.left.as_mut() {
                B::derive_meta(left);
            }
            node
        }
        len => {
            let mid = (len - 1) / 2;
            let mut node = Node::new(take_slot(slots, mid)?, allocator.allocate()?, B::leaf_meta());
            let (left, right) = slots.split_at_mut(mid);
            node.left = build::<V, B>(left, allocator)?;
            node.right = build::<V, B>(&mut right[1..], allocator)?;
            node
        }
    };

    B::derive_meta(&mut node);
    Ok(Some(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::avl::{self, Avl};
    use crate::tree::binary::Unbalanced;
    use crate::tree::bst;
    use crate::tree::TraversalOrder;

    #[test]
    fn test_fifteen_values_form_perfect_tree() {
        let mut allocator = NodeAllocator::new();
        let values: Vec<u32> = (1..=15).collect();
        let root =
            build_balanced::<u32, u32, Avl>(values, &KeyOrdering::natural(), &mut allocator).unwrap();

        assert_eq!(bst::depth(&root), 4);
        assert_eq!(root.as_ref().map(|n| n.value), Some(8));
        assert_eq!(avl::height(&root), 4);
        assert!(Avl::check(&root).is_ok());
        assert_eq!(allocator.node_count(), 15);
    }

    #[test]
    fn test_two_values() {
        let mut allocator = NodeAllocator::new();
        let root =
            build_balanced::<u32, u32, Unbalanced>(vec![1, 2], &KeyOrdering::natural(), &mut allocator)
                .unwrap();

        let mut pre = Vec::new();
        bst::traverse(&root, TraversalOrder::PreOrder, &mut |v| pre.push(*v));
        assert_eq!(pre, vec![2, 1]);
    }

    #[test]
    fn test_pointers_in_preorder() {
        let mut allocator = NodeAllocator::new();
        let root = build_balanced::<u32, u32, Unbalanced>(
            (0..7).collect(),
            &KeyOrdering::natural(),
            &mut allocator,
        )
        .unwrap();

        let mut pointers = Vec::new();
        bst::collect_pointers(&root, &mut pointers);
        assert_eq!(pointers, (1..=7).collect::<Vec<u64>>());
    }

    #[test]
    fn test_rejects_unsorted_input() {
        let mut allocator = NodeAllocator::new();
        let result =
            build_balanced::<u32, u32, Unbalanced>(vec![1, 3, 3], &KeyOrdering::natural(), &mut allocator);
        assert!(matches!(result, Err(TreeError::InvalidArgument(_))));
        assert_eq!(allocator.next_pointer(), 1);
    }

    #[test]
    fn test_avl_heights_for_every_size() {
        for n in 0..100u32 {
            let mut allocator = NodeAllocator::new();
            let root = build_balanced::<u32, u32, Avl>(
                (0..n).collect(),
                &KeyOrdering::natural(),
                &mut allocator,
            )
            .unwrap();
            assert!(Avl::check(&root).is_ok(), "size {}", n);
            assert!(bst::check_order(&root, &KeyOrdering::natural()).is_ok());
        }
    }
}
