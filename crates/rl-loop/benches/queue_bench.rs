//! Record Queue and Loop Benchmarks
//!
//! Throughput of the queue hand-off and of the full loop at each gate depth.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rl_ingest::{encode_banks, ProcessingGate};
use rl_loop::{Dequeue, LoopConfig, MemorySource, PipelineConfig, RecordLoop, RecordQueue};
use rl_record::{Bank, RawRecord, EVENT_ID_BANK_TAG};

const BATCH_SIZES: &[usize] = &[1_000, 10_000];

fn physics(event_number: u32) -> RawRecord {
    RawRecord::new(
        1,
        encode_banks(&[
            Bank::from_words(EVENT_ID_BANK_TAG, &[event_number]),
            Bank::from_words(0x0200, &[event_number; 16]),
        ]),
    )
}

/// Single-threaded enqueue then drain
fn bench_queue_fill_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_fill_drain");

    for &size in BATCH_SIZES {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = RecordQueue::new();
                for tag in 0..size {
                    queue.enqueue(RawRecord::new(tag as u16, Vec::new())).ok();
                }
                queue.close();
                let mut drained = 0;
                while let Dequeue::Record(entry) = queue.dequeue(Duration::from_millis(1)) {
                    drained += 1;
                    black_box(entry);
                }
                black_box(drained)
            })
        });
    }

    group.finish();
}

/// Producer thread handing records to the consumer
fn bench_queue_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_handoff");

    for &size in BATCH_SIZES {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = Arc::new(RecordQueue::new());
                let producer = {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for tag in 0..size {
                            queue.enqueue(RawRecord::new(tag as u16, Vec::new())).ok();
                        }
                        queue.close();
                    })
                };
                let mut received = 0;
                loop {
                    match queue.dequeue(Duration::from_millis(10)) {
                        Dequeue::Record(_) => received += 1,
                        Dequeue::TimedOut => continue,
                        Dequeue::Closed => break,
                    }
                }
                producer.join().ok();
                black_box(received)
            })
        });
    }

    group.finish();
}

/// Full loop over in-memory records at each gate depth
fn bench_loop_gates(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_gate");
    let size = 5_000u32;
    group.throughput(Throughput::Elements(u64::from(size)));

    for gate in [
        ProcessingGate::TransportOnly,
        ProcessingGate::StructuredOnly,
        ProcessingGate::Domain,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(gate), &gate, |b, &gate| {
            b.iter(|| {
                let pipeline = PipelineConfig {
                    loop_config: LoopConfig::new().with_gate(gate),
                    ..Default::default()
                };
                let source = MemorySource::raw((0..size).map(physics));
                let mut record_loop = RecordLoop::new(pipeline, Box::new(source)).unwrap();
                black_box(record_loop.run().ok())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_fill_drain,
    bench_queue_handoff,
    bench_loop_gates
);
criterion_main!(benches);
