//! Shared fixtures for the loop integration tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use rl_ingest::{
    encode_banks, AdapterConfig, BankEventBuilder, EventBuilder, ProcessingGate, PromotionError,
};
use rl_loop::{
    Flow, LoopConfig, MemorySource, PipelineConfig, ProcessingError, Processor, RecordLoop,
    RecordSource,
};
use rl_record::{Bank, DomainEvent, FragmentInfo, RawRecord, StructuredRecord, EVENT_ID_BANK_TAG};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn count(log: &CallLog, entry: &str) -> usize {
    log.lock().iter().filter(|e| e.as_str() == entry).count()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn run_start(run: u32) -> RawRecord {
    RawRecord::new(17, encode_banks(&[Bank::from_words(17, &[1_700_000_000, run, 0])]))
}

pub fn run_end(events: u32) -> RawRecord {
    RawRecord::new(20, encode_banks(&[Bank::from_words(20, &[1_700_000_500, events])]))
}

pub fn physics(event_number: u32) -> RawRecord {
    RawRecord::new(
        1,
        encode_banks(&[
            Bank::from_words(EVENT_ID_BANK_TAG, &[event_number]),
            Bank::from_words(0x0200, &[event_number]),
        ]),
    )
}

pub fn fragment(trigger: u32, index: u16, count: u16) -> RawRecord {
    let mut banks = vec![Bank::from_words(0x0300 + index, &[trigger])];
    if index == 0 {
        banks.insert(0, Bank::from_words(EVENT_ID_BANK_TAG, &[trigger]));
    }
    RawRecord::new(2, encode_banks(&banks))
        .with_fragment(FragmentInfo::new(u64::from(trigger), index, count))
}

/// Run start, `events` physics records numbered from 1, run end
pub fn one_run(run: u32, events: u32) -> Vec<RawRecord> {
    let mut records = vec![run_start(run)];
    records.extend((1..=events).map(physics));
    records.push(run_end(events));
    records
}

pub fn new_loop(config: LoopConfig, source: impl RecordSource + 'static) -> RecordLoop {
    let pipeline = PipelineConfig {
        loop_config: config,
        adapter: AdapterConfig::default(),
    };
    RecordLoop::new(pipeline, Box::new(source)).unwrap()
}

pub fn memory_loop(gate: ProcessingGate, records: Vec<RawRecord>) -> RecordLoop {
    new_loop(LoopConfig::new().with_gate(gate), MemorySource::raw(records))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Records that identify themselves by event number
pub trait Numbered {
    fn number(&self) -> Option<u64>;
}

impl Numbered for RawRecord {
    fn number(&self) -> Option<u64> {
        None
    }
}

impl Numbered for StructuredRecord {
    fn number(&self) -> Option<u64> {
        self.event_number()
    }
}

impl Numbered for DomainEvent {
    fn number(&self) -> Option<u64> {
        self.event_number
    }
}

/// Processor appending `"<name>:<hook>"` to a shared log
pub struct Recorder {
    pub name: &'static str,
    pub log: CallLog,
    pub fail_on: Option<u64>,
    pub skip_on: Option<u64>,
    pub fail_start_job: bool,
}

impl Recorder {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            fail_on: None,
            skip_on: None,
            fail_start_job: false,
        }
    }

    pub fn failing_on(mut self, event_number: u64) -> Self {
        self.fail_on = Some(event_number);
        self
    }

    pub fn skipping(mut self, event_number: u64) -> Self {
        self.skip_on = Some(event_number);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start_job = true;
        self
    }

    fn push(&self, hook: &str) {
        self.log.lock().push(format!("{}:{}", self.name, hook));
    }
}

impl<R: Numbered> Processor<R> for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn start_job(&mut self) -> Result<(), ProcessingError> {
        self.push("start_job");
        if self.fail_start_job {
            return Err(ProcessingError::failed("cannot start"));
        }
        Ok(())
    }

    fn start_run(&mut self, _record: &R) -> Result<(), ProcessingError> {
        self.push("start_run");
        Ok(())
    }

    fn process_event(&mut self, record: &R) -> Result<Flow, ProcessingError> {
        self.push("event");
        let number = record.number();
        if number.is_some() && number == self.fail_on {
            return Err(ProcessingError::failed(format!("event {:?} rejected", number)));
        }
        if number.is_some() && number == self.skip_on {
            return Ok(Flow::SkipRecord);
        }
        Ok(Flow::Continue)
    }

    fn end_run(&mut self, _record: &R) -> Result<(), ProcessingError> {
        self.push("end_run");
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ProcessingError> {
        self.push("end_job");
        Ok(())
    }
}

/// Builder that refuses one event number
pub struct RejectingBuilder {
    inner: BankEventBuilder,
    reject: u64,
}

impl RejectingBuilder {
    pub fn new(reject: u64) -> Self {
        Self {
            inner: BankEventBuilder::new(),
            reject,
        }
    }
}

impl EventBuilder for RejectingBuilder {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn build(
        &mut self,
        record: &StructuredRecord,
        run_number: Option<u32>,
    ) -> Result<DomainEvent, PromotionError> {
        if record.event_number() == Some(self.reject) {
            return Err(PromotionError::Build(format!("event {} rejected", self.reject)));
        }
        self.inner.build(record, run_number)
    }
}
