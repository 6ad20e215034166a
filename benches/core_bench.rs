use criterion::{criterion_group, criterion_main, Criterion};
use verimedia_core::ledger::ProvenanceLedger;
use verimedia_core::{fingerprint, Aggregator, Asset, Embedder, Layer, LayerResult, MediaKind, ProvenanceSigner, Settings};

fn sample_layers() -> Vec<LayerResult> {
    Layer::ALL
        .iter()
        .enumerate()
        .map(|(i, layer)| match i % 3 {
            0 => LayerResult::pass(*layer, 95, "bench"),
            1 => LayerResult::warning(*layer, 65, "bench"),
            _ => LayerResult::unknown(*layer, "bench"),
        })
        .collect()
}

fn bench_digest(c: &mut Criterion) {
    let payload = vec![0xA5u8; 4 * 1024 * 1024];
    c.bench_function("content_digest_4mb", |b| {
        b.iter(|| fingerprint::content_digest(&payload))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = Aggregator::new(&Settings::default()).expect("default settings are valid");
    let layers = sample_layers();
    c.bench_function("aggregate_six_layers", |b| {
        b.iter(|| aggregator.aggregate(&layers).expect("all layers weighted"))
    });
}

fn bench_ledger_append(c: &mut Criterion) {
    let embedder = Embedder::new(ProvenanceSigner::generate(), "Bench");
    let records: Vec<_> = (0..1_000u32)
        .map(|i| {
            let asset = Asset::new(i.to_le_bytes().to_vec(), MediaKind::Image);
            embedder.embed(&asset).expect("embed").1
        })
        .collect();

    c.bench_function("ledger_append_1000", |b| {
        b.iter(|| {
            let mut ledger = ProvenanceLedger::new();
            for record in &records {
                ledger.append(record).expect("append");
            }
            ledger.root().expect("root")
        })
    });
}

criterion_group!(benches, bench_digest, bench_aggregate, bench_ledger_append);
criterion_main!(benches);
