//! Left-leaning red-black balancing
//!
//! Invariants: the root is black, red links lean left, no red node has a
//! red child, and every root-to-null path crosses the same number of black
//! nodes. Insert fixes the path bottom-up with rotations and color flips;
//! remove pushes a red link down the search path (move-red-left /
//! move-red-right) so the node finally removed is never a lone black leaf.

use super::bst::{self, Balance, MutationContext};
use super::facade::TreeKind;
use super::node::{Link, Node};
use super::ordered::OrderedTree;
use super::ordering::KeyOrdering;
use crate::config::DuplicatePolicy;
use crate::{Result, TreeError};
use std::cmp::Ordering;

/// Color of the link from a node's parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Red,
    Black,
}

impl Color {
    fn flip(self) -> Self {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }
}

/// Left-leaning red-black strategy; node metadata is the color
#[derive(Debug, Clone, Copy, Default)]
pub struct RedBlack;

/// Left-leaning red-black binary search tree
pub type RedBlackTree<V, K = V> = OrderedTree<V, K, RedBlack>;

type RbNode<V> = Node<V, Color>;
type RbLink<V> = Link<V, Color>;

fn is_red<V>(link: &RbLink<V>) -> bool {
    matches!(link, Some(node) if node.meta == Color::Red)
}

fn left_left_red<V>(node: &RbNode<V>) -> bool {
    node.left.as_ref().map_or(false, |left| is_red(&left.left))
}

fn right_left_red<V>(node: &RbNode<V>) -> bool {
    node.right.as_ref().map_or(false, |right| is_red(&right.left))
}

fn rotate_left<V>(mut h: Box<RbNode<V>>) -> Box<RbNode<V>> {
    let mut x = match h.right.take() {
        Some(x) => x,
        None => return h,
    };
    h.right = x.left.take();
    x.meta = h.meta;
    h.meta = Color::Red;
    x.left = Some(h);
    x
}

fn rotate_right<V>(mut h: Box<RbNode<V>>) -> Box<RbNode<V>> {
    let mut x = match h.left.take() {
        Some(x) => x,
        None => return h,
    };
    h.left = x.right.take();
    x.meta = h.meta;
    h.meta = Color::Red;
    x.right = Some(h);
    x
}

fn flip_colors<V>(h: &mut RbNode<V>) {
    h.meta = h.meta.flip();
    if let Some(left) = h.left.as_mut() {
        left.meta = left.meta.flip();
    }
    if let Some(right) = h.right.as_mut() {
        right.meta = right.meta.flip();
    }
}

/// Restore left-leaning form at `h` on the way up
fn fix_up<V>(mut h: Box<RbNode<V>>) -> Box<RbNode<V>> {
    if is_red(&h.right) && !is_red(&h.left) {
        h = rotate_left(h);
    }
    if is_red(&h.left) && left_left_red(&h) {
        h = rotate_right(h);
    }
    if is_red(&h.left) && is_red(&h.right) {
        flip_colors(&mut h);
    }
    h
}

fn move_red_left<V>(mut h: Box<RbNode<V>>) -> Box<RbNode<V>> {
    flip_colors(&mut h);
    if right_left_red(&h) {
        h.right = h.right.take().map(rotate_right);
        h = rotate_left(h);
        flip_colors(&mut h);
    }
    h
}

fn move_red_right<V>(mut h: Box<RbNode<V>>) -> Box<RbNode<V>> {
    flip_colors(&mut h);
    if left_left_red(&h) {
        h = rotate_right(h);
        flip_colors(&mut h);
    }
    h
}

fn insert_at<V, K: ?Sized>(
    link: &mut RbLink<V>,
    value: V,
    cx: &mut MutationContext<'_, V, K>,
) -> Result<Option<V>> {
    let node = match link {
        Some(node) => node,
        None => {
            let pointer = cx.allocator.allocate()?;
            *link = Some(Node::new(value, pointer, Color::Red));
            return Ok(None);
        }
    };

    let replaced = match cx.ordering.compare_values(&node.value, &value) {
        Ordering::Greater => insert_at(&mut node.left, value, cx)?,
        Ordering::Less => insert_at(&mut node.right, value, cx)?,
        Ordering::Equal => {
            return match cx.duplicates {
                DuplicatePolicy::Replace => Ok(Some(std::mem::replace(&mut node.value, value))),
                DuplicatePolicy::Reject => Err(TreeError::DuplicateKey),
            };
        }
    };

    if let Some(h) = link.take() {
        *link = Some(fix_up(h));
    }
    Ok(replaced)
}

/// Split off the leftmost node, keeping the remaining subtree balanced
fn delete_min<V>(mut h: Box<RbNode<V>>) -> (RbLink<V>, Box<RbNode<V>>) {
    if h.left.is_none() {
        let rest = h.right.take();
        return (rest, h);
    }
    if !is_red(&h.left) && !left_left_red(&h) {
        h = move_red_left(h);
    }
    match h.left.take() {
        Some(left) => {
            let (rest, min) = delete_min(left);
            h.left = rest;
            (Some(fix_up(h)), min)
        }
        None => {
            let rest = h.right.take();
            (rest, h)
        }
    }
}

/// Remove `key` from the subtree at `h`; the key must be present
fn delete<V, K: ?Sized>(
    mut h: Box<RbNode<V>>,
    key: &K,
    ordering: &KeyOrdering<V, K>,
    removed: &mut Option<V>,
) -> RbLink<V> {
    if ordering.compare_key(&h.value, key) == Ordering::Greater {
        if !is_red(&h.left) && !left_left_red(&h) {
            h = move_red_left(h);
        }
        if let Some(left) = h.left.take() {
            h.left = delete(left, key, ordering, removed);
        }
    } else {
        if is_red(&h.left) {
            h = rotate_right(h);
        }
        if ordering.compare_key(&h.value, key) == Ordering::Equal && h.right.is_none() {
            let rest = h.left.take();
            *removed = Some(h.value);
            return rest;
        }
        if !is_red(&h.right) && !right_left_red(&h) {
            h = move_red_right(h);
        }
        if ordering.compare_key(&h.value, key) == Ordering::Equal {
            // Node stays (and keeps its pointer); the successor's node goes.
            if let Some(right) = h.right.take() {
                let (rest, successor) = delete_min(right);
                h.right = rest;
                *removed = Some(std::mem::replace(&mut h.value, successor.value));
            }
        } else if let Some(right) = h.right.take() {
            h.right = delete(right, key, ordering, removed);
        }
    }
    Some(fix_up(h))
}

fn blacken_root<V>(root: &mut RbLink<V>) {
    if let Some(node) = root.as_mut() {
        node.meta = Color::Black;
    }
}

/// Black height of the subtree, or the first violation found
fn check_colors<V>(link: &RbLink<V>) -> std::result::Result<usize, String> {
    let node = match link {
        Some(node) => node,
        None => return Ok(1),
    };
    if is_red(&node.right) {
        return Err(format!("node {} has a right-leaning red link", node.node_pointer));
    }
    if node.meta == Color::Red && is_red(&node.left) {
        return Err(format!("red node {} has a red child", node.node_pointer));
    }
    let left = check_colors(&node.left)?;
    let right = check_colors(&node.right)?;
    if left != right {
        return Err(format!(
            "node {} has black heights {} and {}",
            node.node_pointer, left, right
        ));
    }
    Ok(left + usize::from(node.meta == Color::Black))
}

fn paint_level<V>(link: &mut RbLink<V>, depth: usize, red_depth: Option<usize>) {
    if let Some(node) = link.as_mut() {
        node.meta = if Some(depth) == red_depth { Color::Red } else { Color::Black };
        paint_level(&mut node.left, depth + 1, red_depth);
        paint_level(&mut node.right, depth + 1, red_depth);
    }
}

fn normalize<V>(link: RbLink<V>) -> RbLink<V> {
    link.map(|mut node| {
        node.left = normalize(node.left.take());
        node.right = normalize(node.right.take());
        fix_up(node)
    })
}

impl Balance for RedBlack {
    type Meta = Color;

    const KIND: TreeKind = TreeKind::RedBlack;

    const TRAILER_SIZE: usize = 1;

    fn leaf_meta() -> Color {
        Color::Red
    }

    fn rebalance<V>(node: Box<RbNode<V>>) -> Box<RbNode<V>> {
        fix_up(node)
    }

    fn insert<V, K: ?Sized>(
        root: &mut RbLink<V>,
        value: V,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Result<Option<V>> {
        let replaced = insert_at(root, value, cx)?;
        blacken_root(root);
        Ok(replaced)
    }

    fn remove<V, K: ?Sized>(
        root: &mut RbLink<V>,
        key: &K,
        cx: &mut MutationContext<'_, V, K>,
    ) -> Option<V> {
        // The delete descent reshapes the tree, so only start it for a hit.
        bst::search(root, key, cx.ordering)?;

        let mut h = root.take()?;
        if !is_red(&h.left) && !is_red(&h.right) {
            h.meta = Color::Red;
        }
        let mut removed = None;
        *root = delete(h, key, cx.ordering, &mut removed);
        blacken_root(root);

        if removed.is_some() {
            cx.allocator.release();
        }
        removed
    }

    /// Deepest level red when it is incomplete, everything else black, then
    /// fold right-leaning and doubled red links into left-leaning form.
    fn finish_build<V>(mut root: RbLink<V>, len: usize) -> RbLink<V> {
        let levels = bst::depth(&root);
        let full = u32::try_from(levels)
            .ok()
            .and_then(|l| 1u128.checked_shl(l))
            .map_or(false, |cap| cap - 1 == len as u128);
        let red_depth = if full { None } else { Some(levels) };

        paint_level(&mut root, 1, red_depth);
        let mut root = normalize(root);
        blacken_root(&mut root);
        root
    }

    fn encode_meta(meta: &Color, trailer: &mut [u8]) {
        trailer[0] = match meta {
            Color::Red => 0,
            Color::Black => 1,
        };
    }

    fn decode_meta(trailer: &[u8]) -> Result<Color> {
        match trailer.first() {
            Some(0) => Ok(Color::Red),
            Some(1) => Ok(Color::Black),
            other => Err(TreeError::corruption(format!("invalid color byte {:?}", other))),
        }
    }

    fn depth_limit(len: u64) -> Option<usize> {
        Some(bst::logarithmic_depth(len))
    }

    fn check<V>(root: &RbLink<V>) -> std::result::Result<(), String> {
        if is_red(root) {
            return Err("root is red".into());
        }
        check_colors(root).map(|_| ())
    }
}
