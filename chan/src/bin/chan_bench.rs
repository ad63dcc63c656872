//! Channel throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin chan_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::sync::Arc;
use std::sync::Barrier;
use std::time::Instant;

use chan::{Capacity, Registry, Timeout};

const ITERATIONS: usize = 1 << 18;
const BOUNDED_SIZE: usize = 1024;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn unique_name(tag: &str) -> String {
    format!("bench-{}-{}", tag, std::process::id())
}

/// One producer, one consumer, `ITERATIONS` numbers through `capacity`.
fn bench_throughput(
    label: &str,
    capacity: Capacity,
    producer_cpu: Option<usize>,
    consumer_cpu: Option<usize>,
) {
    let name = unique_name(label);
    let producer = Registry::global().create(&name, capacity).unwrap();
    let ready = Arc::new(Barrier::new(2));
    let ready_clone = Arc::clone(&ready);
    let name_clone = name.clone();

    let consumer_thread = std::thread::spawn(move || {
        let consumer = Registry::global().lookup(&name_clone).unwrap();
        pin_to_cpu(consumer_cpu);
        ready_clone.wait();

        for expected in 0..ITERATIONS {
            let value = consumer
                .recv(Timeout::Infinite)
                .and_then(|m| m.as_number())
                .unwrap();
            assert!(
                (value - expected as f64).abs() < f64::EPSILON,
                "Data corruption: expected {expected}, got {value}"
            );
        }
    });

    ready.wait();
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..ITERATIONS {
        producer.send(i as f64, Timeout::Infinite).unwrap();
    }
    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  {label:<10} {ops_per_ms} ops/ms");
}

/// Ping-pong over two rendezvous channels.
fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let ping_name = unique_name("ping");
    let pong_name = unique_name("pong");
    let ping = Registry::global()
        .create(&ping_name, Capacity::RENDEZVOUS)
        .unwrap();
    let pong = Registry::global()
        .create(&pong_name, Capacity::RENDEZVOUS)
        .unwrap();

    let ready = Arc::new(Barrier::new(2));
    let ready_clone = Arc::clone(&ready);

    let responder = std::thread::spawn(move || {
        let ping = Registry::global().lookup(&ping_name).unwrap();
        let pong = Registry::global().lookup(&pong_name).unwrap();
        pin_to_cpu(consumer_cpu);
        ready_clone.wait();

        for _ in 0..ITERATIONS {
            let msg = ping.recv(Timeout::Infinite).unwrap();
            pong.send(msg, Timeout::Infinite).unwrap();
        }
    });

    ready.wait();
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..ITERATIONS {
        ping.send(i as f64, Timeout::Infinite).unwrap();
        pong.recv(Timeout::Infinite).unwrap();
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / ITERATIONS as u128;
    println!("  {rtt_ns} ns RTT");
}

fn main() {
    chan::init_tracing();
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("chan (bounded={BOUNDED_SIZE}, iters={ITERATIONS}):");
    bench_throughput("unbounded", Capacity::Unbounded, producer_cpu, consumer_cpu);
    bench_throughput(
        "bounded",
        Capacity::Bounded(BOUNDED_SIZE),
        producer_cpu,
        consumer_cpu,
    );
    bench_throughput("rendezvous", Capacity::RENDEZVOUS, producer_cpu, consumer_cpu);
    bench_rtt(producer_cpu, consumer_cpu);
}
