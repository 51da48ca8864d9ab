//! Criterion benchmarks for the `SQLite` local store.
//!
//! These measure the marker flip and merged-write paths that run once per
//! committed chunk during a sync.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use ledgersync_state::prelude::*;

fn spec() -> TableSpec {
    let schema = EntitySchema::new()
        .field("amount", FieldType::Number)
        .field("date", FieldType::Timestamp);
    TableSpec::new("transactions", "id", &schema)
}

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            json!({"id": format!("t{i}"), "amount": i, "date": "2024-01-01T00:00:00Z"})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect()
}

fn bench_mark_synced(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_store/mark_synced");

    for chunk in [50, 500] {
        group.bench_with_input(BenchmarkId::new("rows", chunk), &chunk, |b, &chunk| {
            let store = SqliteLocalStore::in_memory().unwrap();
            store.ensure_table(&spec()).unwrap();
            for record in records(chunk) {
                store.insert(&spec(), &record).unwrap();
            }
            let keys: Vec<String> = (0..chunk).map(|i| format!("t{i}")).collect();

            b.iter(|| store.mark_synced(&spec(), &keys).unwrap());
        });
    }

    group.finish();
}

fn bench_apply_merged(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_store/apply_merged");

    group.bench_function("500_rows", |b| {
        let store = SqliteLocalStore::in_memory().unwrap();
        store.ensure_table(&spec()).unwrap();
        let batch = records(500);

        b.iter(|| store.apply_merged(&spec(), &batch).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_mark_synced, bench_apply_merged);
criterion_main!(benches);
