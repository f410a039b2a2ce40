//! Built-in monitoring processors, one per stage

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rl_loop::{Flow, ProcessingError, Processor};
use rl_record::{DomainEvent, RawRecord, StructuredRecord};
use serde::Serialize;

/// Counters the monitor prints next to the loop report
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSummary {
    pub transport: TransportSummary,
    pub runs: Vec<RunSummary>,
    /// Words seen per collection tag across all domain events
    pub collection_words: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportSummary {
    pub records: u64,
    pub bytes: u64,
    pub fragments: u64,
    pub by_tag: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_number: Option<u32>,
    pub events: u64,
    /// Event count declared by the run end record
    pub declared_events: Option<u32>,
    pub first_event: Option<u64>,
    pub last_event: Option<u64>,
    pub closed: bool,
}

pub type SharedSummary = Arc<Mutex<MonitorSummary>>;

/// Transport stage: record and byte throughput
pub struct ThroughputCounter {
    summary: SharedSummary,
}

impl ThroughputCounter {
    pub fn new(summary: &SharedSummary) -> Self {
        Self {
            summary: Arc::clone(summary),
        }
    }

    fn count(&self, record: &RawRecord) {
        let mut summary = self.summary.lock();
        let transport = &mut summary.transport;
        transport.records += 1;
        transport.bytes += record.len() as u64;
        if record.is_fragment() {
            transport.fragments += 1;
        }
        *transport.by_tag.entry(record.tag).or_default() += 1;
    }
}

impl Processor<RawRecord> for ThroughputCounter {
    fn name(&self) -> &str {
        "throughput"
    }

    fn start_run(&mut self, record: &RawRecord) -> Result<(), ProcessingError> {
        self.count(record);
        Ok(())
    }

    fn process_event(&mut self, record: &RawRecord) -> Result<Flow, ProcessingError> {
        self.count(record);
        Ok(Flow::Continue)
    }

    fn end_run(&mut self, record: &RawRecord) -> Result<(), ProcessingError> {
        self.count(record);
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ProcessingError> {
        let summary = self.summary.lock();
        log::info!(
            "[Monitor] {} transport records, {} bytes",
            summary.transport.records,
            summary.transport.bytes
        );
        Ok(())
    }
}

/// Structured stage: per-run event bookkeeping
pub struct RunTracker {
    summary: SharedSummary,
}

impl RunTracker {
    pub fn new(summary: &SharedSummary) -> Self {
        Self {
            summary: Arc::clone(summary),
        }
    }
}

impl Processor<StructuredRecord> for RunTracker {
    fn name(&self) -> &str {
        "run-tracker"
    }

    fn start_run(&mut self, record: &StructuredRecord) -> Result<(), ProcessingError> {
        let run_number = record.run_info().and_then(|r| r.run_number);
        log::info!("[Monitor] Run {:?} started", run_number);
        self.summary.lock().runs.push(RunSummary {
            run_number,
            ..Default::default()
        });
        Ok(())
    }

    fn process_event(&mut self, record: &StructuredRecord) -> Result<Flow, ProcessingError> {
        let mut summary = self.summary.lock();
        if summary.runs.last().is_none_or(|run| run.closed) {
            // Readouts before the first run start
            summary.runs.push(RunSummary::default());
        }
        if let Some(run) = summary.runs.last_mut() {
            run.events += 1;
            if let Some(event) = record.event_number() {
                run.first_event.get_or_insert(event);
                run.last_event = Some(event);
            }
        }
        Ok(Flow::Continue)
    }

    fn end_run(&mut self, record: &StructuredRecord) -> Result<(), ProcessingError> {
        let mut summary = self.summary.lock();
        if let Some(run) = summary.runs.last_mut().filter(|run| !run.closed) {
            run.closed = true;
            run.declared_events = record.run_info().and_then(|r| r.event_count);
            log::info!(
                "[Monitor] Run {:?} ended: {} events seen, {:?} declared",
                run.run_number,
                run.events,
                run.declared_events
            );
        }
        Ok(())
    }
}

/// Domain stage: collection sizes
pub struct CollectionCounter {
    summary: SharedSummary,
}

impl CollectionCounter {
    pub fn new(summary: &SharedSummary) -> Self {
        Self {
            summary: Arc::clone(summary),
        }
    }
}

impl Processor<DomainEvent> for CollectionCounter {
    fn name(&self) -> &str {
        "collections"
    }

    fn process_event(&mut self, event: &DomainEvent) -> Result<Flow, ProcessingError> {
        if !event.is_physics() {
            return Err(ProcessingError::InvalidRecord(format!(
                "{:?} event {:?} has no readout collections",
                event.kind, event.event_number
            )));
        }
        let mut summary = self.summary.lock();
        for (tag, words) in &event.collections {
            *summary.collection_words.entry(*tag).or_default() += words.len() as u64;
        }
        Ok(Flow::Continue)
    }
}
