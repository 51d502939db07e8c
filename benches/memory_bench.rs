//! Memory Pool Benchmark Suite
//!
//! Benchmarks for allocation patterns over the pooled allocator:
//! - Pooled vs direct heap allocation churn
//! - Reuse rate under mixed size classes
//! - Handle clone/drop overhead
//! - Teardown cost with populated caches
//!
//! Run with: `cargo bench --bench memory_bench`

use std::hint::black_box;
use std::time::Instant;

use memforge::{HostDevice, MemoryPool, PoolConfig};

const CHURN_ROUNDS: usize = 10_000;

fn bench_direct_heap_churn(size: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..CHURN_ROUNDS {
        let buf = vec![0u8; size];
        black_box(buf.as_ptr());
    }
    start.elapsed().as_secs_f64()
}

fn bench_pooled_churn(pool: &MemoryPool, size: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..CHURN_ROUNDS {
        let handle = pool.allocate(size).expect("host allocation should succeed");
        black_box(handle.as_ptr());
    }
    start.elapsed().as_secs_f64()
}

fn benchmark_alloc_release_churn() {
    println!("\n--- Allocate/release churn ({} rounds) ---", CHURN_ROUNDS);

    for size in [256usize, 4 * 1024, 256 * 1024] {
        let pool = HostDevice::new().memory_pool();
        // Warm the class so the pooled loop measures reuse, not first touch.
        drop(pool.allocate(size).expect("host allocation should succeed"));

        let direct = bench_direct_heap_churn(size);
        let pooled = bench_pooled_churn(&pool, size);
        println!(
            "size {:>8}: direct {:>8.2} us/op, pooled {:>8.2} us/op",
            size,
            direct / CHURN_ROUNDS as f64 * 1e6,
            pooled / CHURN_ROUNDS as f64 * 1e6,
        );

        let stats = pool.stats();
        println!("              {}", stats);
    }
}

fn benchmark_mixed_size_classes() {
    println!("\n--- Mixed size-class traffic ---");

    let pool = HostDevice::new().memory_pool();
    let sizes = [64usize, 1000, 4096, 100, 65_536, 300];

    let start = Instant::now();
    for round in 0..CHURN_ROUNDS {
        let size = sizes[round % sizes.len()];
        let handle = pool.allocate(size).expect("host allocation should succeed");
        black_box(handle.as_ptr());
    }
    let elapsed = start.elapsed().as_secs_f64();

    let stats = pool.stats();
    println!(
        "{} rounds in {:.2} ms, reuse rate {:.1}%",
        CHURN_ROUNDS,
        elapsed * 1e3,
        stats.reuse_rate_percent
    );
    println!("{}", stats);
}

fn benchmark_handle_clone() {
    println!("\n--- Handle clone/drop ---");

    let pool = HostDevice::new().memory_pool();
    let handle = pool.allocate(4096).expect("host allocation should succeed");

    let start = Instant::now();
    for _ in 0..CHURN_ROUNDS {
        black_box(handle.clone());
    }
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "clone+drop: {:.1} ns/op",
        elapsed / CHURN_ROUNDS as f64 * 1e9
    );
}

fn benchmark_capped_cache() {
    println!("\n--- Capped per-class cache ---");

    let pool = HostDevice::new()
        .memory_pool_with_config(PoolConfig::new().with_max_cached_per_class(4));

    let start = Instant::now();
    for _ in 0..CHURN_ROUNDS / 10 {
        let handles: Vec<_> = (0..8)
            .map(|_| pool.allocate(4096).expect("host allocation should succeed"))
            .collect();
        black_box(handles.len());
    }
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "burst of 8 with cap 4: {:.2} us/burst, {}",
        elapsed / (CHURN_ROUNDS / 10) as f64 * 1e6,
        pool.stats()
    );
}

fn benchmark_teardown() {
    println!("\n--- Teardown with populated caches ---");

    for blocks in [16usize, 256, 4096] {
        let pool = HostDevice::new().memory_pool();
        let handles: Vec<_> = (0..blocks)
            .map(|_| pool.allocate(1024).expect("host allocation should succeed"))
            .collect();
        drop(handles);

        let start = Instant::now();
        drop(pool);
        println!(
            "{:>5} cached blocks: {:.2} us",
            blocks,
            start.elapsed().as_secs_f64() * 1e6
        );
    }
}

fn main() {
    memforge::logging::init_logging_default();

    println!("====================================");
    println!("MemForge Memory Benchmark Suite");
    println!("====================================");

    benchmark_alloc_release_churn();
    benchmark_mixed_size_classes();
    benchmark_handle_clone();
    benchmark_capped_cache();
    benchmark_teardown();

    println!("\n====================================");
    println!("Benchmark Complete");
    println!("====================================");
}
