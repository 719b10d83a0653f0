//! Benchmarks for FrostKV storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use frostkv::store::CollectionStore;
use frostkv::Item;

/// Feed throughput: store items into a fresh collection version
fn bench_store(c: &mut Criterion) {
    c.bench_function("store_1000_items", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let store = CollectionStore::open(dir.path(), 2, 10_000, 64 << 20).unwrap();
                let items: Vec<Item> = (0..1_000i64)
                    .map(|i| Item::new(vec![0xAA; 256], vec![i, i + 1]))
                    .collect();
                (dir, store, items)
            },
            |(_dir, mut store, items)| {
                for item in &items {
                    store.store(item).unwrap();
                }
                store.end_of_feed();
            },
            BatchSize::SmallInput,
        )
    });
}

/// Query throughput: primary-key lookups against a sealed version
fn bench_get_by_primary(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut store = CollectionStore::open(dir.path(), 2, 100_000, 64 << 20).unwrap();
    for i in 0..100_000i64 {
        store.store(&Item::new(vec![0xBB; 64], vec![i, i + 1])).unwrap();
    }
    store.end_of_feed();

    let mut key = 0i64;
    c.bench_function("get_by_primary", |b| {
        b.iter(|| {
            key = (key + 7919) % 100_000;
            let hits = store.get_by_primary(key);
            assert_eq!(hits.len(), 1);
        })
    });
}

criterion_group!(benches, bench_store, bench_get_by_primary);
criterion_main!(benches);
