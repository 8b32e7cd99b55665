//! Tree benchmarks: insert, lookup and serialize for every variant

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use tempfile::TempDir;
use treestore::{FixedCodec, KeyOrdering, SearchTree, Tree, TreeConfig, TreeKind};

const KINDS: [TreeKind; 4] = [TreeKind::Binary, TreeKind::Avl, TreeKind::RedBlack, TreeKind::BTree];

fn shuffled_keys(count: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));
    keys
}

fn config() -> TreeConfig {
    TreeConfig::for_testing().with_degree(16)
}

fn populated(kind: TreeKind, keys: &[u64]) -> Tree<u64> {
    let tree = Tree::new(kind, KeyOrdering::natural(), config()).expect("create tree");
    for key in keys {
        tree.insert(*key).expect("insert");
    }
    tree
}

/// Random-order inserts into an empty tree
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/insert");
    let keys = shuffled_keys(10_000);
    group.throughput(Throughput::Elements(keys.len() as u64));

    for kind in KINDS {
        group.bench_with_input(BenchmarkId::new(kind.name(), "10k"), &keys, |b, keys| {
            b.iter(|| black_box(populated(kind, keys)));
        });
    }

    group.finish();
}

/// Point lookups, alternating hits and misses
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/search");
    group.throughput(Throughput::Elements(1));

    for count in [1_000u64, 100_000] {
        let keys = shuffled_keys(count);
        for kind in KINDS {
            let tree = populated(kind, &keys);
            group.bench_with_input(BenchmarkId::new(kind.name(), count), &count, |b, &count| {
                let mut counter = 0u64;
                b.iter(|| {
                    counter = (counter + 7919) % (count * 2);
                    black_box(tree.search(&counter))
                });
            });
        }
    }

    group.finish();
}

/// Sorted bulk load against one-by-one insertion
fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/from_sorted");

    for kind in KINDS {
        group.bench_function(kind.name(), |b| {
            b.iter(|| {
                let tree = Tree::from_sorted(kind, (0..10_000u64).collect(), KeyOrdering::natural(), config())
                    .expect("bulk load");
                black_box(tree.len())
            });
        });
    }

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/serialize");
    let temp_dir = TempDir::new().expect("create temp dir");
    let codec = FixedCodec::<u64>::new();
    let keys = shuffled_keys(10_000);

    for kind in KINDS {
        let tree = populated(kind, &keys);
        let path = temp_dir.path().join(format!("{}.tree", kind));
        group.bench_function(kind.name(), |b| {
            b.iter(|| tree.serialize(&path, &codec).expect("serialize"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_bulk_load, bench_serialize);
criterion_main!(benches);
