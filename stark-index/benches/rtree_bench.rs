//! R-tree benchmarks.
//!
//! Measures:
//! - Bulk-load time at several input sizes
//! - Window query latency
//! - k-NN latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stark_core::cell::{NPoint, NRectRange};
use stark_index::RTree;

/// Deterministic random point MBRs in [0, 1000)^2.
fn generate_entries(count: usize) -> Vec<(NRectRange, usize)> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let x: f64 = rng.gen_range(0.0..1000.0);
            let y: f64 = rng.gen_range(0.0..1000.0);
            (NRectRange::from_envelope(&[x, y], &[x, y]).unwrap(), i)
        })
        .collect()
}

fn built_tree(count: usize) -> RTree<usize> {
    let mut tree = RTree::new();
    for (mbr, id) in generate_entries(count) {
        tree.insert(mbr, id).unwrap();
    }
    tree.build().unwrap();
    tree
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_build");
    for count in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let entries = generate_entries(count);
            b.iter(|| {
                let mut tree = RTree::new();
                for (mbr, id) in entries.iter().cloned() {
                    tree.insert(mbr, id).unwrap();
                }
                tree.build().unwrap();
                black_box(tree.len())
            });
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let tree = built_tree(100_000);
    let window = NRectRange::new2(200.0, 200.0, 250.0, 250.0).unwrap();

    c.bench_function("rtree_window_query", |b| {
        b.iter(|| black_box(tree.query(&window).unwrap().count()))
    });
}

fn bench_knn(c: &mut Criterion) {
    let tree = built_tree(100_000);
    let q = NPoint::new2(500.0, 500.0).unwrap();

    c.bench_function("rtree_knn_10", |b| {
        b.iter(|| black_box(tree.knn(&q, 10).unwrap().len()))
    });
}

criterion_group!(benches, bench_build, bench_query, bench_knn);
criterion_main!(benches);
