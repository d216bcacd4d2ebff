//! Performance benchmarks for live collections.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use live_collection::{
    AssetPayload, AssetUploadPipeline, BinaryStore, CollectionSchema, Fields, FsBinaryStore,
    FsBinaryStoreConfig, MemoryBinaryStore, OrderPolicy, Record, RecordId, Timestamp,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn make_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut fields = Fields::new();
            fields.insert("titulo".into(), json!(format!("Product {}", i)));
            fields.insert("precio".into(), json!((i * 7919) % 1000));
            Record {
                id: RecordId::new(format!("id-{:06}", (i * 104_729) % count)),
                fields,
                asset_url: None,
                // Clustered timestamps so ties are exercised.
                created_at: Timestamp((i / 4) as i64),
                updated_at: None,
            }
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark ordering a full snapshot under each policy
fn bench_snapshot_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_ordering");

    let policies = [
        ("created_desc", OrderPolicy::CreatedDesc),
        (
            "precio_asc",
            OrderPolicy::Field {
                name: "precio".into(),
                descending: false,
            },
        ),
    ];

    for size in [100, 1_000, 10_000] {
        let records = make_records(size);
        for (name, policy) in &policies {
            group.bench_with_input(BenchmarkId::new(*name, size), &records, |b, records| {
                b.iter(|| {
                    let mut snapshot = records.clone();
                    policy.sort(&mut snapshot);
                    black_box(snapshot);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark schema validation of a product create
fn bench_validation(c: &mut Criterion) {
    let schema = CollectionSchema::products();
    let mut fields = Fields::new();
    fields.insert("titulo".into(), json!("Lamp"));
    fields.insert("descripcion".into(), json!("Desk lamp"));
    fields.insert("categoria".into(), json!("home"));
    fields.insert("precio".into(), json!("20.5"));

    c.bench_function("validate_create", |b| {
        b.iter(|| black_box(schema.validate_create(&fields, true).unwrap()));
    });
}

/// Benchmark uploads against both stores
fn bench_upload(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("upload");

    for size in [1024, 64 * 1024, 1024 * 1024] {
        let payload = AssetPayload::new("image.png", "image/png", vec![7u8; size]);

        let memory: Arc<dyn BinaryStore> = Arc::new(MemoryBinaryStore::new());
        let pipeline = AssetUploadPipeline::new(memory);
        group.bench_with_input(BenchmarkId::new("memory", size), &payload, |b, payload| {
            b.iter(|| black_box(rt.block_on(pipeline.upload(payload, "productos")).unwrap()));
        });

        let dir = TempDir::new().unwrap();
        let fs: Arc<dyn BinaryStore> = Arc::new(
            FsBinaryStore::open(FsBinaryStoreConfig {
                path: dir.path().join("assets"),
                cache_size: 8,
                base_url: None,
            })
            .unwrap(),
        );
        let pipeline = AssetUploadPipeline::new(fs);
        group.bench_with_input(BenchmarkId::new("filesystem", size), &payload, |b, payload| {
            b.iter(|| black_box(rt.block_on(pipeline.upload(payload, "productos")).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_snapshot_ordering, bench_validation, bench_upload);
criterion_main!(benches);
