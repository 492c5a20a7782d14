//! Merge and batch pipeline benchmarks
//!
//! Measures end-to-end throughput of fan-in merging, batching, and the two
//! composed.
//!
//! Run with: cargo bench --bench pipeline_bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use tributary_core::stream::{self, BatchConfig};

const ITEMS_PER_INPUT: u64 = 1_000;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn spawn_producers(inputs: u64) -> Vec<mpsc::Receiver<u64>> {
    (0..inputs)
        .map(|_| {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                for i in 0..ITEMS_PER_INPUT {
                    if tx.send(i).await.is_err() {
                        break;
                    }
                }
            });
            rx
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("merge_fan_in");

    for inputs in [2u64, 10, 100] {
        group.throughput(Throughput::Elements(inputs * ITEMS_PER_INPUT));
        group.bench_with_input(BenchmarkId::from_parameter(inputs), &inputs, |b, &inputs| {
            b.to_async(&rt).iter(|| async move {
                let (mut output, _cancel) = stream::merge(spawn_producers(inputs)).into_parts();
                let mut count = 0u64;
                while let Some(item) = output.recv().await {
                    black_box(item);
                    count += 1;
                }
                assert_eq!(count, inputs * ITEMS_PER_INPUT);
            });
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(10_000));

    for size in [1usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let input = futures::stream::iter(0..10_000u64);
                let mut batches = stream::batch(input, BatchConfig::with_size(size));
                while let Some(batch) = batches.recv().await {
                    black_box(batch);
                }
            });
        });
    }
    group.finish();
}

fn bench_merge_then_batch(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("merge_then_batch");
    group.throughput(Throughput::Elements(10 * ITEMS_PER_INPUT));

    group.bench_function("10_inputs_batch_64", |b| {
        b.to_async(&rt).iter(|| async {
            let (output, _cancel) = stream::merge(spawn_producers(10)).into_parts();
            let mut batches = stream::batch(output, BatchConfig::default());
            while let Some(batch) = batches.recv().await {
                black_box(batch);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_merge, bench_batch, bench_merge_then_batch);
criterion_main!(benches);
