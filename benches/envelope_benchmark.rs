//! Cost of the per-document cryptography and of a full store/retrieve.
//!
//! Run with: `cargo bench --bench envelope_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docvault::storage_key::derive_storage_key;
use docvault::{
    BindingContext, CryptoEngine, Document, DocumentVault, InMemoryStorage, KeyIdentifier,
    KeyRing, Owner,
};

fn engine() -> CryptoEngine {
    CryptoEngine::new(KeyRing::single(KeyIdentifier::new(1).unwrap(), "passord").unwrap())
}

fn benchmark_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let engine = engine();
    let owner = Owner::new("12345678901");
    let id = engine.new_document_id().unwrap();
    let ctx = BindingContext::new(&id, &owner);

    let sizes = [("100B", 100), ("10KB", 10 * 1024), ("1MB", 1024 * 1024)];

    for (name, size) in sizes {
        let payload = vec![0u8; size];
        let blob = engine.encrypt(ctx, &payload).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", name), &payload, |b, payload| {
            b.iter(|| engine.encrypt(ctx, black_box(payload)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decrypt", name), &blob, |b, blob| {
            b.iter(|| engine.decrypt(ctx, black_box(blob)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_storage_key(c: &mut Criterion) {
    let engine = engine();
    let owner = Owner::new("12345678901");
    let id = engine.new_document_id().unwrap();

    c.bench_function("derive_storage_key", |b| {
        b.iter(|| derive_storage_key(&engine, black_box(&owner), black_box(&id)).unwrap())
    });
}

fn benchmark_vault(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let vault = DocumentVault::new(engine(), InMemoryStorage::new());
    let owner = Owner::new("12345678901");
    let document = Document::new("Tittel1", "application/pdf", vec![0u8; 10 * 1024]);

    let mut group = c.benchmark_group("vault");
    group.throughput(Throughput::Bytes(document.content.len() as u64));

    group.bench_function("store_retrieve_delete_10KB", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let id = vault.store(&owner, black_box(&document), false).await.unwrap();
                let retrieved = vault.retrieve(&id, &owner).await.unwrap();
                vault.delete(&id, &owner).await.unwrap();
                retrieved
            })
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_envelope, benchmark_storage_key, benchmark_vault);
criterion_main!(benches);
