//! End-to-end scenarios through the public API

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use tempfile::TempDir;
use treestore::{
    AvlTree, BTree, BinaryTree, FixedCodec, KeyOrdering, RedBlackTree, SearchTree, TraversalOrder, Tree,
    TreeConfig, TreeError, TreeKind,
};

fn in_order<F: FnOnce(&mut dyn FnMut(&u64))>(traverse: F) -> Vec<u64> {
    let mut out = Vec::new();
    traverse(&mut |v: &u64| out.push(*v));
    out
}

#[test]
fn avl_stays_balanced_after_every_insert() {
    let tree = AvlTree::<u64>::new(KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();

    for key in [8u64, 4, 12, 2, 6, 10, 14, 1, 3, 5, 7, 9, 11, 13, 15] {
        tree.insert(key).unwrap();
        tree.check_invariants().unwrap();
    }

    assert_eq!(tree.to_vec(), (1..=15).collect::<Vec<_>>());
    assert_eq!(tree.height(), 4);
}

#[test]
fn balanced_build_of_fifteen_has_height_four() {
    let tree = BinaryTree::<u64>::from_sorted((1..=15).collect(), KeyOrdering::natural(), TreeConfig::for_testing())
        .unwrap();

    assert_eq!(tree.height(), 4);
    assert_eq!(tree.len(), 15);
    assert_eq!(tree.search(&8), Some(8));
}

#[test]
fn three_node_binary_tree_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("three.tree");
    let codec = FixedCodec::<u64>::new();

    let tree = BinaryTree::<u64>::new(KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
    for key in [8u64, 4, 12] {
        tree.insert(key).unwrap();
    }
    tree.serialize(&path, &codec).unwrap();

    let parsed = BinaryTree::<u64>::parse(&path, &codec, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
    assert_eq!(parsed.to_vec(), vec![4, 8, 12]);
    assert_eq!(parsed.metadata().node_count, 3);
    assert_eq!(parsed.node_pointers(), vec![1, 2, 3]);
}

#[test]
fn btree_root_splits_on_fourth_insert() {
    let tree = BTree::<u64>::new(KeyOrdering::natural(), TreeConfig::for_testing().with_degree(2)).unwrap();

    for key in 1..=6u64 {
        tree.insert(key).unwrap();
        assert!(tree.node_sizes().iter().all(|n| *n <= 3), "after inserting {}", key);
        let expected_height = if key < 4 { 0 } else { 1 };
        assert_eq!(tree.height(), expected_height, "after inserting {}", key);
    }

    tree.check_invariants().unwrap();
    assert_eq!(tree.to_vec(), (1..=6).collect::<Vec<_>>());
}

#[test]
fn removing_a_leaf_shrinks_node_count_only_in_memory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("leaf.tree");
    let codec = FixedCodec::<u64>::new();

    let tree = BinaryTree::<u64>::new(KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
    for key in [8u64, 4, 12] {
        tree.insert(key).unwrap();
    }
    tree.serialize(&path, &codec).unwrap();

    assert_eq!(tree.remove(&12), Some(12));
    assert_eq!(tree.metadata().node_count, 2);
    assert_eq!(tree.node_pointers(), vec![1, 2]);

    let on_disk = BinaryTree::<u64>::parse(&path, &codec, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
    assert_eq!(on_disk.metadata().node_count, 3);

    // The freed pointer is not handed out again.
    tree.insert(20).unwrap();
    assert_eq!(tree.node_pointers(), vec![1, 2, 4]);
}

#[test]
fn tampered_header_count_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tampered.tree");
    let codec = FixedCodec::<u64>::new();

    let tree = RedBlackTree::<u64>::from_sorted((1..=10).collect(), KeyOrdering::natural(), TreeConfig::for_testing())
        .unwrap();
    tree.serialize(&path, &codec).unwrap();

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&11u64.to_le_bytes()).unwrap();
    drop(file);

    let result = RedBlackTree::<u64>::parse(&path, &codec, KeyOrdering::natural(), TreeConfig::for_testing());
    assert!(matches!(result, Err(TreeError::Corruption(_))));
}

#[test]
fn facade_serves_every_kind() {
    let temp_dir = TempDir::new().unwrap();
    let codec = FixedCodec::<u64>::new();

    for kind in [TreeKind::Binary, TreeKind::Avl, TreeKind::RedBlack, TreeKind::BTree] {
        let tree: Tree<u64> = Tree::new(kind, KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
        for key in [5u64, 3, 9, 1, 4, 7, 11] {
            assert_eq!(tree.insert(key).unwrap(), None);
        }
        assert_eq!(tree.remove(&3).unwrap(), Some(3));

        let path = temp_dir.path().join(format!("{}.tree", kind));
        tree.serialize(&path, &codec).unwrap();
        let parsed: Tree<u64> = Tree::parse(kind, &path, &codec, KeyOrdering::natural(), TreeConfig::for_testing())
            .unwrap();

        assert_eq!(in_order(|visit| parsed.traverse_inorder(visit)), vec![1, 4, 5, 7, 9, 11], "{}", kind);
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed.metadata().kind, kind);
        assert_eq!(
            in_order(|visit| parsed.traverse(TraversalOrder::PreOrder, visit)),
            in_order(|visit| tree.traverse(TraversalOrder::PreOrder, visit)),
        );
    }
}

#[test]
fn node_pointers_strictly_increase_across_a_session() {
    let tree = AvlTree::<u64>::new(KeyOrdering::natural(), TreeConfig::for_testing()).unwrap();
    let mut last = 0;

    for round in 0..5u64 {
        for key in 0..20u64 {
            tree.insert(round * 100 + key).unwrap();
            let next = tree.metadata().next_node_pointer;
            assert!(next > last);
            last = next;
        }
        for key in 0..10u64 {
            tree.remove(&(round * 100 + key * 2));
        }
    }

    let mut pointers = tree.node_pointers();
    let count = pointers.len();
    pointers.sort_unstable();
    pointers.dedup();
    assert_eq!(pointers.len(), count);
    assert_eq!(count as u64, tree.len());
}
