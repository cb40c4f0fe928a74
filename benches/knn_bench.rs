//! Benchmarks for adjacency compression and KNN construction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use knngraph::compression::{self, Aggregation, Compression, TailStrategy};
use knngraph::similarity::SimilarityMetric;
use knngraph::{CompressedGraph, Knn, KnnConfig, KnnContext, KnnNodePropertySpec, NodePropertyValues};
use rand::prelude::*;

fn random_targets(len: usize, max: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..len).map(|_| rng.gen_range(0..max)).collect()
}

fn random_vectors(n: usize, dim: usize) -> Vec<Option<Vec<f32>>> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| Some((0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()))
        .collect()
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    let targets = random_targets(4096, 1_000_000);

    for (name, compression) in [
        ("uncompressed", Compression::Uncompressed),
        ("var_long", Compression::VarLong),
        ("packed_aligned", Compression::Packed(TailStrategy::BlockAligned)),
        ("packed_var_long_tail", Compression::Packed(TailStrategy::VarLongTail)),
    ] {
        group.throughput(Throughput::Elements(targets.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", name), &compression, |b, &compression| {
            b.iter(|| {
                let mut values = targets.clone();
                let mut out = Vec::with_capacity(values.len() * 8);
                compression::compress(compression, &mut values, None, Aggregation::None, &mut out).unwrap();
                black_box(out)
            })
        });

        let mut values = targets.clone();
        let mut bytes = Vec::new();
        let degree =
            compression::compress(compression, &mut values, None, Aggregation::None, &mut bytes).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", name), &compression, |b, &compression| {
            b.iter(|| black_box(compression::decompress(compression, &bytes, degree, false).unwrap()))
        });
    }
    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn");
    group.sample_size(10);

    for &n in &[1_000usize, 5_000] {
        let graph = CompressedGraph::empty(n as u64)
            .with_node_property("embedding", NodePropertyValues::FloatArray(random_vectors(n, 32)))
            .unwrap();
        let config = KnnConfig {
            top_k: 10,
            concurrency: 4,
            random_seed: Some(1),
            node_properties: vec![KnnNodePropertySpec::new("embedding", SimilarityMetric::Cosine)],
            ..KnnConfig::default()
        };
        let context = KnnContext::with_threads(4).unwrap();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("cosine_32d", n), &n, |b, _| {
            b.iter(|| {
                let knn = Knn::of_properties(graph.clone(), config.clone(), context.clone()).unwrap();
                black_box(knn.compute().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compression, bench_knn);
criterion_main!(benches);
