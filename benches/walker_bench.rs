//! Benchmarks for bulkstore
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_queue_operations(c: &mut Criterion) {
    use bulkstore::walker::queue::{BoundedHandoffQueue, DynamicWorkQueue};

    c.bench_function("handoff_put_poll_heap", |b| {
        let queue = BoundedHandoffQueue::new(10_000, true);
        let mut n = 0u64;

        b.iter(|| {
            n = n.wrapping_add(7919);
            queue.put(n % 1_000);
            let received = queue.poll();
            black_box(received);
        })
    });

    c.bench_function("handoff_put_poll_fifo", |b| {
        let queue = BoundedHandoffQueue::new(10_000, false);

        b.iter(|| {
            queue.put(42u64);
            black_box(queue.poll());
        })
    });

    c.bench_function("dynamic_add_poll_deregister", |b| {
        let queue = DynamicWorkQueue::new();
        // Keeps the queue open between iterations
        queue.add("/keepalive".to_string());
        let _held = queue.poll_guarded();

        b.iter(|| {
            queue.add("/test/path".to_string());
            let item = queue.poll();
            queue.deregister();
            black_box(item);
        })
    });
}

fn benchmark_chunk_layout(c: &mut Criterion) {
    use bulkstore::walker::plan::ChunkSizing;

    let sizing = ChunkSizing::new(64 * 1024 * 1024, 64 * 1024 * 1024);

    c.bench_function("chunk_count_1tb", |b| {
        b.iter(|| black_box(sizing.chunk_count(black_box(1u64 << 40))))
    });

    c.bench_function("chunk_layout_100gb", |b| {
        b.iter(|| {
            let total: u64 = sizing
                .layout(black_box(100 * 1024 * 1024 * 1024 + 17))
                .map(|(_, size)| size)
                .sum();
            black_box(total)
        })
    });
}

criterion_group!(benches, benchmark_queue_operations, benchmark_chunk_layout);
criterion_main!(benches);
