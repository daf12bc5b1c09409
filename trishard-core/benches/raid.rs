//! Benchmarks for split and merge throughput
//!
//! Run with: cargo bench --package trishard-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use trishard_core::stripe::{merge_block, split_block, Stripe};
use trishard_core::{merge, split, BLOCK_SIZE, CHUNK_SIZE};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn split_set(data: &[u8], passphrase: Option<&[u8]>) -> ([Vec<u8>; 3], Vec<u8>) {
    let mut shards: [Vec<u8>; 3] = Default::default();
    let mut meta = Vec::new();
    split(&mut Cursor::new(data), &mut shards, &mut meta, passphrase).unwrap();
    (shards, meta)
}

/// Benchmark the per-block transforms in isolation
fn bench_block(c: &mut Criterion) {
    let chunk = generate_data(CHUNK_SIZE);
    let mut stripe = Stripe::allocate().unwrap();
    let mut out = vec![0u8; CHUNK_SIZE];

    let mut group = c.benchmark_group("block");
    group.throughput(Throughput::Bytes(CHUNK_SIZE as u64));

    group.bench_function("split_block", |b| {
        b.iter(|| split_block(black_box(&chunk), &mut stripe))
    });

    split_block(&chunk, &mut stripe);
    // Block 0: shard 1 holds the primary
    group.bench_function("merge_block_primary_lost", |b| {
        b.iter(|| merge_block(black_box(&stripe), 0, 1, 0, &mut out))
    });

    group.finish();
}

/// Benchmark splitting at various data sizes
fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for size in [
        64 * BLOCK_SIZE,       // 64 KB
        1024 * 1024,           // 1 MB
        16 * 1024 * 1024,      // 16 MB
    ] {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("plain", size), &data, |b, data| {
            b.iter(|| split_set(black_box(data), None))
        });
        group.bench_with_input(BenchmarkId::new("encrypted", size), &data, |b, data| {
            b.iter(|| split_set(black_box(data), Some(b"bench")))
        });
    }

    group.finish();
}

/// Benchmark merging with and without a lost shard
fn bench_merge(c: &mut Criterion) {
    let data = generate_data(16 * 1024 * 1024);
    let (shards, meta) = split_set(&data, None);

    let mut group = c.benchmark_group("merge_16MB");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (name, lost) in [("healthy", None), ("shard_0_lost", Some(0usize))] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let streams: [Option<Cursor<&[u8]>>; 3] = std::array::from_fn(|i| {
                    (Some(i) != lost).then(|| Cursor::new(shards[i].as_slice()))
                });
                let mut out = Vec::with_capacity(data.len());
                merge(streams, &mut Cursor::new(&meta), None, &mut out).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_block, bench_split, bench_merge);
criterion_main!(benches);
