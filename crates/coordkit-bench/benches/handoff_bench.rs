//! Handoff and permit benchmarks: slot channel, pool, semaphore.

use std::sync::Arc;
use std::thread;

use coordkit_core::{ResourcePool, Semaphore, SlotChannel};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn bench_slot_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_uncontended");
    let channel = SlotChannel::new();
    group.bench_function("try_put_try_take", |b| {
        b.iter(|| {
            let _ = channel.try_put(criterion::black_box(7u64));
            criterion::black_box(channel.try_take());
        });
    });
    group.bench_function("put_take", |b| {
        b.iter(|| {
            channel.put(criterion::black_box(7u64));
            criterion::black_box(channel.take());
        });
    });
    group.finish();
}

fn bench_slot_cross_thread(c: &mut Criterion) {
    let messages: u64 = 1_000;
    let mut group = c.benchmark_group("slot_cross_thread");
    group.throughput(Throughput::Elements(messages));

    for &capacity in &[1usize, 4, 32] {
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            &capacity,
            |b, &cap| {
                b.iter(|| {
                    let channel = Arc::new(SlotChannel::with_capacity(cap));
                    let producer = {
                        let channel = Arc::clone(&channel);
                        thread::spawn(move || {
                            for i in 0..messages {
                                channel.put(i);
                            }
                        })
                    };
                    let mut sum = 0u64;
                    for _ in 0..messages {
                        sum += channel.take();
                    }
                    producer.join().expect("producer");
                    criterion::black_box(sum);
                });
            },
        );
    }
    group.finish();
}

fn bench_pool_and_semaphore(c: &mut Criterion) {
    let mut group = c.benchmark_group("permits_uncontended");

    let pool = ResourcePool::new((0..4).map(|i| format!("Item{i}")));
    group.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let token = pool.acquire();
            criterion::black_box(token.index());
            let _ = pool.release(token);
        });
    });
    group.bench_function("pool_lease", |b| {
        b.iter(|| {
            let lease = pool.lease();
            criterion::black_box(lease.len());
        });
    });

    let semaphore = Semaphore::new(4);
    group.bench_function("semaphore_acquire_release", |b| {
        b.iter(|| {
            semaphore.acquire();
            semaphore.release();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_slot_uncontended,
    bench_slot_cross_thread,
    bench_pool_and_semaphore
);
criterion_main!(benches);
