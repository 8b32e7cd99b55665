//! AVL balancing
//!
//! Each node stores the height of its subtree (leaf 1, absent child 0).
//! After every insert or remove the nodes along the modified path are
//! rebalanced bottom-up with single or double rotations.

use super::bst::{self, Balance};
use super::facade::TreeKind;
use super::node::{Link, Node};
use super::ordered::OrderedTree;

/// AVL strategy; node metadata is the subtree height
#[derive(Debug, Clone, Copy, Default)]
pub struct Avl;

/// Height-balanced binary search tree
pub type AvlTree<V, K = V> = OrderedTree<V, K, Avl>;

type AvlNode<V> = Node<V, u32>;

pub(crate) fn height<V>(link: &Link<V, u32>) -> u32 {
    link.as_ref().map_or(0, |node| node.meta)
}

fn update_height<V>(node: &mut AvlNode<V>) {
    node.meta = 1 + height(&node.left).max(height(&node.right));
}

/// Left height minus right height
pub(crate) fn balance_factor<V>(node: &AvlNode<V>) -> i64 {
    i64::from(height(&node.left)) - i64::from(height(&node.right))
}

pub(crate) fn rotate_left<V>(mut node: Box<AvlNode<V>>) -> Box<AvlNode<V>> {
    let mut pivot = match node.right.take() {
        Some(pivot) => pivot,
        None => return node,
    };
    node.right = pivot.left.take();
    update_height(&mut node);
    pivot.left = Some(node);
    update_height(&mut pivot);
    pivot
}

pub(crate) fn rotate_right<V>(mut node: Box<AvlNode<V>>) -> Box<AvlNode<V>> {
    let mut pivot = match node.left.take() {
        Some(pivot) => pivot,
        None => return node,
    };
    node.left = pivot.right.take();
    update_height(&mut node);
    pivot.right = Some(node);
    update_height(&mut pivot);
    pivot
}

fn rebalance<V>(mut node: Box<AvlNode<V>>) -> Box<AvlNode<V>> {
    update_height(&mut node);
    let factor = balance_factor(&node);

    if factor > 1 {
        // Left-right: straighten the left child first.
        if node.left.as_deref().map_or(0, balance_factor) < 0 {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }
    if factor < -1 {
        // Right-left
        if node.right.as_deref().map_or(0, balance_factor) > 0 {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }
    node
}

fn check_heights<V>(link: &Link<V, u32>) -> Result<u32, String> {
    let node = match link {
        Some(node) => node,
        None => return Ok(0),
    };
    let left = check_heights(&node.left)?;
    let right = check_heights(&node.right)?;
    if left.abs_diff(right) > 1 {
        return Err(format!(
            "node {} is unbalanced ({} vs {})",
            node.node_pointer, left, right
        ));
    }
    let expected = 1 + left.max(right);
    if node.meta != expected {
        return Err(format!(
            "node {} records height {} but has {}",
            node.node_pointer, node.meta, expected
        ));
    }
    Ok(expected)
}

impl Balance for Avl {
    type Meta = u32;

    const KIND: TreeKind = TreeKind::Avl;

    fn leaf_meta() -> u32 {
        1
    }

    fn rebalance<V>(node: Box<AvlNode<V>>) -> Box<AvlNode<V>> {
        rebalance(node)
    }

    fn derive_meta<V>(node: &mut AvlNode<V>) {
        update_height(node);
    }

    fn depth_limit(len: u64) -> Option<usize> {
        Some(bst::logarithmic_depth(len))
    }

    fn check<V>(root: &Link<V, u32>) -> Result<(), String> {
        check_heights(root).map(|_| ())
    }
}
