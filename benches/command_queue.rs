//! Benchmarks for the command queue and delivery path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plotembed_rs::backend::{CommandQueue, CommandSink, IoWorker, Popped};
use plotembed_rs::surface::WindowHandle;
use plotembed_rs::types::substitute_window;
use plotembed_rs::{Command, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Sink that only counts lines
#[derive(Default)]
struct CountingSink {
    lines: AtomicU64,
}

impl CommandSink for CountingSink {
    fn write_line(&self, line: &str) -> Result<()> {
        black_box(line);
        self.lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn commands(count: usize) -> Vec<Command> {
    (0..count)
        .map(|i| Command::new(format!("plot sin({}*x)", i)).unwrap())
        .collect()
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_pop");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let batch = commands(size);
            b.iter(|| {
                let queue = CommandQueue::new();
                for command in batch.iter().cloned() {
                    queue.push(command);
                }
                queue.close();
                let mut popped = 0;
                while let Popped::Command(command) = queue.pop_blocking() {
                    black_box(command);
                    popped += 1;
                }
                assert_eq!(popped, size);
            });
        });
    }

    group.finish();
}

fn bench_concurrent_producers(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_concurrent_producers");
    const PER_PRODUCER: usize = 1_000;

    for producers in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*producers * PER_PRODUCER) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            producers,
            |b, &producers| {
                b.iter(|| {
                    let queue = Arc::new(CommandQueue::new());
                    let handles: Vec<_> = (0..producers)
                        .map(|_| {
                            let queue = queue.clone();
                            thread::spawn(move || {
                                for command in commands(PER_PRODUCER) {
                                    queue.push(command);
                                }
                            })
                        })
                        .collect();

                    let mut popped = 0;
                    while popped < producers * PER_PRODUCER {
                        if let Popped::Command(command) = queue.pop_blocking() {
                            black_box(command);
                            popped += 1;
                        }
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_worker_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_delivery");
    let size = 1_000;
    group.throughput(Throughput::Elements(size as u64));

    group.bench_function("counting_sink", |b| {
        let batch = commands(size);
        b.iter(|| {
            let sink = Arc::new(CountingSink::default());
            let queue = Arc::new(CommandQueue::new());
            let (tx, _rx) = crossbeam_channel::unbounded();
            let worker = IoWorker::spawn(1, queue.clone(), sink.clone(), tx).unwrap();

            for command in batch.iter().cloned() {
                queue.push(command);
            }
            queue.close();
            black_box(worker.join().unwrap());
            assert_eq!(sink.lines.load(Ordering::Relaxed), size as u64);
        });
    });

    group.finish();
}

fn bench_setup_command(c: &mut Criterion) {
    let handle = WindowHandle::from_raw(0x3a0000b);
    let template = "set terminal x11 window \"{window}\"";

    c.bench_function("substitute_window", |b| {
        b.iter(|| substitute_window(black_box(template), black_box(&handle)))
    });

    c.bench_function("command_setup", |b| {
        b.iter(|| Command::setup(black_box(template), black_box(&handle)))
    });
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_concurrent_producers,
    bench_worker_delivery,
    bench_setup_command
);
criterion_main!(benches);
