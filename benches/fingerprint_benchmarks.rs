//! Fingerprint and split benchmarks
//!
//! Benchmarks for the per-call cost of tracking:
//! - Dataset fingerprinting, both row-order policies
//! - Seeded split (shuffle + gather)
//! - Lineage graph node dedup

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use trueno_lineage::fingerprint::{Fingerprint, Fingerprinter, RowOrder};
use trueno_lineage::lineage::{LineageGraph, NodeAttributes, NodeSpec, TransformerAttributes};
use trueno_lineage::split::random_split;

/// Create a test RecordBatch with specified number of rows
#[allow(clippy::cast_precision_loss)]
fn create_test_batch(num_rows: i64) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, false),
        Field::new("category", DataType::Utf8, false),
    ]);

    let id_array = Int64Array::from_iter_values(0..num_rows);
    let value_array = Float64Array::from_iter_values((0..num_rows).map(|i| (i as f64) * 1.5));
    let category_array =
        StringArray::from_iter_values((0..num_rows).map(|i| format!("category_{}", i % 10)));

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(id_array),
            Arc::new(value_array),
            Arc::new(category_array),
        ],
    )
    .unwrap()
}

/// Benchmark dataset fingerprinting
fn bench_dataset_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_fingerprint");

    for size in [1_000, 10_000, 100_000] {
        let batch = create_test_batch(size);
        for (label, order) in [("significant", RowOrder::Significant), ("irrelevant", RowOrder::Irrelevant)] {
            let fingerprinter = Fingerprinter::new(order, 6);
            group.bench_with_input(BenchmarkId::new(label, size), &batch, |b, batch| {
                b.iter(|| fingerprinter.dataset(black_box(batch)).unwrap());
            });
        }
    }

    group.finish();
}

/// Benchmark seeded 70/30 split
fn bench_random_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_split");

    for size in [1_000, 10_000, 100_000] {
        let batch = create_test_batch(size);
        group.bench_with_input(BenchmarkId::new("plain", size), &batch, |b, batch| {
            b.iter(|| random_split(black_box(batch), &[0.7, 0.3], 42, None, 1e-6).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("stratified", size), &batch, |b, batch| {
            b.iter(|| {
                random_split(black_box(batch), &[0.7, 0.3], 42, Some("category"), 1e-6).unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark get-or-create on an already-populated graph
fn bench_node_dedup(c: &mut Criterion) {
    let spec = |i: u32| {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&i.to_le_bytes());
        NodeSpec::new(
            Fingerprint::from_bytes(bytes),
            NodeAttributes::Transformer(TransformerAttributes {
                component_type: "Scaler".to_string(),
                params: serde_json::Value::Null,
                steps: Vec::new(),
            }),
        )
    };
    let graph = LineageGraph::new();
    for i in 0..10_000 {
        graph.get_or_create_node(spec(i));
    }

    c.bench_function("node_dedup_hit", |b| {
        b.iter(|| graph.get_or_create_node(black_box(spec(5_000))));
    });
}

criterion_group!(
    benches,
    bench_dataset_fingerprint,
    bench_random_split,
    bench_node_dedup
);
criterion_main!(benches);
