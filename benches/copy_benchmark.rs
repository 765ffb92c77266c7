//! Performance benchmarks for MultiCopy
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use multicopy::accounting::Account;
use multicopy::backend::{Features, Fs, LocalFs, MemoryFs, MemoryObject, MemoryOptions, Object};
use multicopy::config::{ConcurrencyPolicy, TransferConfig};
use multicopy::multipart::{multi_thread_copy, plan_chunks, PlanRequest};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn config(chunk_size: u64, streams: usize) -> TransferConfig {
    TransferConfig {
        multi_thread_chunk_size: chunk_size,
        ..Default::default()
    }
    .with_streams(streams)
}

fn bench_memory_backends(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_copy");

    let size = 32 * 1024 * 1024;
    let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    let src: Arc<dyn Object> = Arc::new(MemoryObject::detached("src", data, Features::default()));
    group.throughput(Throughput::Bytes(size as u64));

    let variants = [
        ("native", MemoryOptions::default().with_chunk_size(4 * 1024 * 1024)),
        (
            "writer_at",
            MemoryOptions::default().with_chunk_writer(false).with_writer_at(true),
        ),
    ];
    for (name, options) in variants {
        for streams in [1usize, 4, 8] {
            group.bench_with_input(BenchmarkId::new(name, streams), &streams, |b, &streams| {
                let cfg = config(4 * 1024 * 1024, streams);
                b.to_async(&runtime).iter(|| async {
                    let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new("bench", options));
                    let account = Arc::new(Account::new("src"));
                    black_box(
                        multi_thread_copy(&dst, "dst", &src, &cfg, account, &CancellationToken::new())
                            .await
                            .unwrap(),
                    );
                });
            });
        }
    }

    group.finish();
}

fn bench_local_copy(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("local_copy");
    group.sample_size(10);

    for size in [16 * 1024 * 1024, 64 * 1024 * 1024] {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        create_test_file(src_dir.path(), "large.bin", size);

        let src_fs = LocalFs::new(src_dir.path());
        let src = runtime.block_on(src_fs.new_object("large.bin")).unwrap();
        let dst: Arc<dyn Fs> = Arc::new(LocalFs::new(dst_dir.path()));
        let cfg = config(8 * 1024 * 1024, 4);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("writer_at", humansize::format_size(size as u64, humansize::BINARY)),
            &size,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    let account = Arc::new(Account::new("large.bin"));
                    black_box(
                        multi_thread_copy(&dst, "large.bin", &src, &cfg, account, &CancellationToken::new())
                            .await
                            .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_plan_chunks(c: &mut Criterion) {
    c.bench_function("plan_chunks", |b| {
        b.iter(|| {
            black_box(plan_chunks(PlanRequest {
                size: black_box(10 * 1024 * 1024 * 1024),
                chunk_size: black_box(64 * 1024 * 1024),
                requested_concurrency: 4,
                explicit: false,
                backend_concurrency: 8,
                policy: ConcurrencyPolicy::PreferLarger,
            }))
        });
    });
}

criterion_group!(benches, bench_memory_backends, bench_local_copy, bench_plan_chunks);

criterion_main!(benches);
