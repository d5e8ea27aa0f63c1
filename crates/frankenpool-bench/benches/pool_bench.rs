//! Pool benchmarks against the system allocator.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use frankenpool_core::{Pool, PoolConfig, PoolLogLevel};

type Slot = [u64; 2];

fn quiet_pool(chunk_size: usize) -> Pool<Slot> {
    let config = PoolConfig::new()
        .with_chunk_size(chunk_size)
        .with_log_level(PoolLogLevel::Off);
    Pool::with_config(config).expect("pool")
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[1, 4, 16, 64, 256];
    let mut group = c.benchmark_group("alloc_free_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("pool", size), &size, |b, &n| {
            let mut pool = quiet_pool(1024);
            b.iter(|| {
                let loan = pool.allocate(n).expect("fits");
                pool.deallocate(criterion::black_box(loan));
            });
        });
        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &n| {
            b.iter(|| {
                let v: Vec<Slot> = Vec::with_capacity(n);
                criterion::black_box(v);
            });
        });
    }
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");

    group.bench_function("pool_1000x4", |b| {
        let mut pool = quiet_pool(1024);
        b.iter(|| {
            let loans: Vec<_> = (0..1000).map(|_| pool.allocate(4).expect("fits")).collect();
            for loan in loans.into_iter().rev() {
                pool.deallocate(loan);
            }
        });
    });

    group.bench_function("system_1000x4", |b| {
        b.iter(|| {
            let allocs: Vec<Vec<Slot>> = (0..1000).map(|_| Vec::with_capacity(4)).collect();
            criterion::black_box(allocs);
        });
    });

    group.finish();
}

fn bench_fragmented_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_scan");

    for &holes in &[16usize, 128, 512] {
        group.bench_with_input(BenchmarkId::new("pool", holes), &holes, |b, &holes| {
            let mut pool = quiet_pool(holes * 2 + 2);
            // Alternate freed and kept elements: `holes` one-element blocks
            // in front of a two-element tail block.
            let mut kept = Vec::new();
            let mut freed = Vec::new();
            for _ in 0..holes {
                freed.push(pool.allocate(1).expect("fits"));
                kept.push(pool.allocate(1).expect("fits"));
            }
            for loan in freed {
                pool.deallocate(loan);
            }
            b.iter(|| {
                let tail = pool.allocate(2).expect("tail block");
                pool.deallocate(criterion::black_box(tail));
            });
            for loan in kept {
                pool.deallocate(loan);
            }
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_alloc_burst,
    bench_fragmented_scan
);
criterion_main!(benches);
