//! Live Queue Test Suite
//!
//! Tests cover:
//! - Producer thread feeding the loop through the record queue
//! - Stop, pause, resume and single-step from another thread
//! - Framed and JSON-lines file sources

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::*;
use rl_ingest::{write_record, ProcessingGate};
use rl_loop::{
    FramedSource, JsonLinesSource, LoopConfig, LoopHandle, LoopOutcome, LoopState, QueueSource,
    RecordQueue, StatsSnapshot,
};
use rl_record::{RecordKind, StructuredRecord};

fn live_config() -> LoopConfig {
    LoopConfig::new().with_dequeue_timeout_ms(10)
}

fn wait_for(handle: &LoopHandle, done: impl Fn(&StatsSnapshot, LoopState) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done(&handle.stats(), handle.state()) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRODUCER / CONSUMER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_producer_thread_through_queue() {
    let log = call_log();
    let queue = Arc::new(RecordQueue::new());
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for record in one_run(4, 200) {
                queue.enqueue(record).unwrap();
                if queue.enqueued_count() % 50 == 0 {
                    thread::sleep(Duration::from_millis(2));
                }
            }
            queue.close();
        })
    };

    let mut record_loop = new_loop(live_config(), QueueSource::new(Arc::clone(&queue)))
        .with_domain_processor(Recorder::new("d", &log));
    let report = record_loop.run().unwrap();
    producer.join().unwrap();

    assert_eq!(report.outcome, LoopOutcome::Finished);
    assert_eq!(report.supplied, Some(202));
    assert_eq!(report.stats.records_pulled, 202);
    assert_eq!(count(&log, "d:event"), 200);
    assert_eq!(count(&log, "d:end_job"), 1);
}

#[test]
fn test_stop_while_waiting_on_empty_queue() {
    let log = call_log();
    let queue = Arc::new(RecordQueue::new());
    queue.enqueue(physics(1)).unwrap();

    let record_loop = new_loop(live_config(), QueueSource::new(Arc::clone(&queue)))
        .with_domain_processor(Recorder::new("d", &log));
    let handle = record_loop.handle();
    let consumer = thread::spawn(move || {
        let mut record_loop = record_loop;
        record_loop.run()
    });

    assert!(wait_for(&handle, |stats, _| stats.records_pulled == 1));
    handle.stop().unwrap();
    let report = consumer.join().unwrap().unwrap();

    assert_eq!(report.state, LoopState::Finished);
    assert_eq!(handle.state(), LoopState::Finished);
    assert_eq!(count(&log, "d:end_job"), 1);
    assert!(queue.is_closed());
}

#[test]
fn test_pause_step_resume() {
    let log = call_log();
    let record_loop = memory_loop(ProcessingGate::Domain, one_run(1, 10))
        .with_domain_processor(Recorder::new("d", &log));
    let handle = record_loop.handle();
    handle.pause().unwrap();

    let consumer = thread::spawn(move || {
        let mut record_loop = record_loop;
        record_loop.run()
    });

    assert!(wait_for(&handle, |_, state| state == LoopState::Paused));
    assert_eq!(handle.stats().records_pulled, 0);

    handle.step().unwrap();
    handle.step().unwrap();
    assert!(wait_for(&handle, |stats, _| stats.records_pulled == 2));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.stats().records_pulled, 2);
    assert_eq!(handle.state(), LoopState::Paused);

    handle.resume().unwrap();
    let report = consumer.join().unwrap().unwrap();
    assert_eq!(report.stats.records_pulled, 12);
    assert_eq!(count(&log, "d:event"), 10);
}

#[test]
fn test_stop_while_paused() {
    let record_loop = memory_loop(ProcessingGate::Domain, one_run(1, 10));
    let handle = record_loop.handle();
    handle.pause().unwrap();
    let consumer = thread::spawn(move || {
        let mut record_loop = record_loop;
        record_loop.run()
    });

    assert!(wait_for(&handle, |_, state| state == LoopState::Paused));
    handle.stop().unwrap();
    let report = consumer.join().unwrap().unwrap();
    assert_eq!(report.stats.records_pulled, 0);
    assert_eq!(report.outcome, LoopOutcome::Finished);
}

#[test]
fn test_dropping_last_handle_while_paused_ends_job() {
    let log = call_log();
    let record_loop = memory_loop(ProcessingGate::Domain, one_run(1, 10))
        .with_domain_processor(Recorder::new("d", &log));
    let handle = record_loop.handle();
    handle.pause().unwrap();
    drop(handle);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut record_loop = record_loop;
        let _ = done_tx.send(record_loop.run());
    });

    let report = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("loop still blocked after its handles were dropped")
        .unwrap();
    assert_eq!(report.stats.records_pulled, 0);
    assert_eq!(report.state, LoopState::Finished);
    assert_eq!(count(&log, "d:end_job"), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_framed_source_through_loop() {
    let mut buf = Vec::new();
    for record in one_run(8, 25) {
        write_record(&mut buf, &record).unwrap();
    }

    let log = call_log();
    let mut record_loop = new_loop(LoopConfig::new(), FramedSource::new(Cursor::new(buf)))
        .with_domain_processor(Recorder::new("d", &log));
    let report = record_loop.run().unwrap();

    assert_eq!(report.source, "framed");
    assert_eq!(report.stats.records_pulled, 27);
    assert_eq!(count(&log, "d:event"), 25);
}

#[test]
fn test_truncated_file_reports_source_error() {
    let mut buf = Vec::new();
    for record in one_run(8, 3) {
        write_record(&mut buf, &record).unwrap();
    }
    buf.truncate(buf.len() - 3);

    let mut record_loop = new_loop(LoopConfig::new(), FramedSource::new(Cursor::new(buf)));
    let report = record_loop.run().unwrap();
    assert_eq!(report.stats.records_pulled, 4);
    assert_eq!(report.stats.source_errors, 1);
    assert_eq!(report.outcome, LoopOutcome::FinishedWithErrors { errors: 1 });
}

#[test]
fn test_json_lines_source_through_loop() {
    let lines: Vec<String> = (1..=3)
        .map(|n| {
            let record = StructuredRecord::new(1, RecordKind::SteadyState, vec![]).with_event_number(n);
            serde_json::to_string(&record).unwrap()
        })
        .collect();

    let log = call_log();
    let source = JsonLinesSource::new(Cursor::new(lines.join("\n")));
    let mut record_loop = new_loop(LoopConfig::new(), source)
        .with_structured_processor(Recorder::new("s", &log).failing_on(2));
    let report = record_loop.run().unwrap();

    assert_eq!(count(&log, "s:event"), 3);
    assert_eq!(report.stats.processing_errors, 1);
    assert_eq!(report.stats.domain_events, 3);
}

fn json_lines_with_bad_line() -> String {
    let line = |n: u64| {
        let record = StructuredRecord::new(1, RecordKind::SteadyState, vec![]).with_event_number(n);
        serde_json::to_string(&record).unwrap()
    };
    [line(1), "not json".to_string(), line(2), line(3)].join("\n")
}

#[test]
fn test_malformed_json_line_is_skipped() {
    let log = call_log();
    let source = JsonLinesSource::new(Cursor::new(json_lines_with_bad_line()));
    let mut record_loop = new_loop(LoopConfig::new(), source)
        .with_structured_processor(Recorder::new("s", &log));
    let report = record_loop.run().unwrap();

    assert_eq!(count(&log, "s:event"), 3);
    assert_eq!(report.stats.records_pulled, 3);
    assert_eq!(report.stats.source_errors, 1);
    assert_eq!(report.supplied, Some(3));
    assert_eq!(report.outcome, LoopOutcome::FinishedWithErrors { errors: 1 });
}

#[test]
fn test_malformed_json_line_aborts_on_error() {
    let log = call_log();
    let source = JsonLinesSource::new(Cursor::new(json_lines_with_bad_line()));
    let mut record_loop = new_loop(LoopConfig::new().with_stop_on_error(true), source)
        .with_structured_processor(Recorder::new("s", &log));
    let report = record_loop.run().unwrap();

    assert_eq!(count(&log, "s:event"), 1);
    assert_eq!(count(&log, "s:end_job"), 1);
    assert!(matches!(
        report.outcome,
        LoopOutcome::Aborted { sequence: Some(0), .. }
    ));
}
