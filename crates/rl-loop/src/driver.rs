//! Record loop — the job/run/event state machine
//!
//! One loop thread pulls records from a [`RecordSource`], wraps each pull in
//! a [`CompositeRecord`], promotes it through the [`StageAdapter`] and
//! dispatches every stage the gate permits, in stage order. Control commands
//! from a [`LoopHandle`] are honored only between records.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use rl_ingest::{EventBuilder, PromotionReport, StageAdapter};
use rl_record::{CompositeRecord, DomainEvent, RawRecord, RecordKind, Stage, StructuredRecord};
use serde::{Deserialize, Serialize};

use crate::config::{LoopConfig, PipelineConfig};
use crate::error::{LoopError, LoopResult};
use crate::processor::{Dispatch, Processor, ProcessorFailure, StageProcessors};
use crate::source::{Pull, RecordSource};
use crate::stats::{LoopOutcome, LoopReport, LoopStats, StatsSnapshot};

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Loop execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopping,
    Finished,
    Error,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL
// ═══════════════════════════════════════════════════════════════════════════════

/// Commands a [`LoopHandle`] sends to the loop thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    /// Finish after the in-flight record
    Stop,
    /// Hold at the next record boundary
    Pause,
    Resume,
    /// While paused, process one pull and pause again
    Step,
}

/// Cloneable remote control for a running loop
#[derive(Debug, Clone)]
pub struct LoopHandle {
    commands: Sender<LoopCommand>,
    state: Arc<RwLock<LoopState>>,
    stats: Arc<LoopStats>,
}

impl LoopHandle {
    pub fn send(&self, command: LoopCommand) -> LoopResult<()> {
        self.commands
            .send(command)
            .map_err(|_| LoopError::Disconnected)
    }

    pub fn stop(&self) -> LoopResult<()> {
        self.send(LoopCommand::Stop)
    }

    pub fn pause(&self) -> LoopResult<()> {
        self.send(LoopCommand::Pause)
    }

    pub fn resume(&self) -> LoopResult<()> {
        self.send(LoopCommand::Resume)
    }

    pub fn step(&self) -> LoopResult<()> {
        self.send(LoopCommand::Step)
    }

    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

enum Control {
    Proceed,
    Stop,
}

enum Next {
    Continue,
    Finish,
}

struct Abort {
    sequence: Option<u64>,
    reason: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives records from a source through the adapter and processor chains
pub struct RecordLoop {
    config: LoopConfig,
    source: Box<dyn RecordSource>,
    adapter: StageAdapter,
    processors: StageProcessors,

    state: Arc<RwLock<LoopState>>,
    stats: Arc<LoopStats>,
    /// Dropped once the job is driven, so only handles keep the channel open
    command_tx: Option<Sender<LoopCommand>>,
    command_rx: Receiver<LoopCommand>,

    next_sequence: u64,
    abort: Option<Abort>,
    job_ended: bool,
    started_at: Option<DateTime<Utc>>,
    start_time: Option<Instant>,
    elapsed_ms: u64,
}

impl RecordLoop {
    /// Create a loop over `source`
    pub fn new(config: PipelineConfig, mut source: Box<dyn RecordSource>) -> LoopResult<Self> {
        config.validate()?;
        let PipelineConfig {
            loop_config,
            adapter,
        } = config;

        let adapter = StageAdapter::new(adapter, loop_config.gate)?;
        source.set_poll_timeout(loop_config.dequeue_timeout());
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            config: loop_config,
            source,
            adapter,
            processors: StageProcessors::new(),
            state: Arc::new(RwLock::new(LoopState::Idle)),
            stats: Arc::new(LoopStats::new()),
            command_tx: Some(command_tx),
            command_rx,
            next_sequence: 0,
            abort: None,
            job_ended: false,
            started_at: None,
            start_time: None,
            elapsed_ms: 0,
        })
    }

    /// Replace the deep-promotion builder
    pub fn with_builder(mut self, builder: Box<dyn EventBuilder>) -> Self {
        self.adapter = self.adapter.with_builder(builder);
        self
    }

    pub fn with_transport_processor<P: Processor<RawRecord> + 'static>(mut self, p: P) -> Self {
        self.processors.transport.add(p);
        self
    }

    pub fn with_structured_processor<P: Processor<StructuredRecord> + 'static>(
        mut self,
        p: P,
    ) -> Self {
        self.processors.structured.add(p);
        self
    }

    pub fn with_domain_processor<P: Processor<DomainEvent> + 'static>(mut self, p: P) -> Self {
        self.processors.domain.add(p);
        self
    }

    /// Registered processors, for adding boxed processors
    pub fn processors_mut(&mut self) -> &mut StageProcessors {
        &mut self.processors
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn adapter(&self) -> &StageAdapter {
        &self.adapter
    }

    pub fn handle(&self) -> LoopHandle {
        let commands = match &self.command_tx {
            Some(tx) => tx.clone(),
            None => crossbeam_channel::unbounded().0,
        };
        LoopHandle {
            commands,
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.write() = state;
    }

    /// Idle → Running: start the job on every permitted processor
    ///
    /// A failing `start_job` ends the job at once: every permitted processor
    /// still gets its `end_job` and the loop lands in `Error`.
    pub fn start(&mut self) -> LoopResult<()> {
        let state = self.state();
        if state != LoopState::Idle {
            return Err(LoopError::InvalidState {
                operation: "start",
                state,
            });
        }

        self.started_at = Some(Utc::now());
        self.start_time = Some(Instant::now());
        self.set_state(LoopState::Running);
        log::info!(
            "[Loop] Starting job: source '{}', gate {}, {} processors",
            self.source.name(),
            self.config.gate,
            self.processors.active_count(self.config.gate)
        );

        if let Err(failure) = self.processors.start_job(self.config.gate) {
            log::error!("[Loop] {}", failure);
            LoopStats::bump(&self.stats.processing_errors);
            self.abort = Some(Abort {
                sequence: None,
                reason: failure.to_string(),
            });
            self.end_job();
        }
        Ok(())
    }

    /// Run the job to completion and report how it ended
    pub fn run(&mut self) -> LoopResult<LoopReport> {
        match self.state() {
            LoopState::Idle => self.start()?,
            LoopState::Running | LoopState::Paused => {}
            state => {
                return Err(LoopError::InvalidState {
                    operation: "run",
                    state,
                })
            }
        }

        if !self.job_ended {
            self.drive();
            self.end_job();
        }
        Ok(self.report())
    }

    /// Snapshot of the job so far
    pub fn report(&self) -> LoopReport {
        let stats = self.stats.snapshot();
        let outcome = match &self.abort {
            Some(abort) => LoopOutcome::Aborted {
                sequence: abort.sequence,
                reason: abort.reason.clone(),
            },
            None if stats.total_errors() > 0 => LoopOutcome::FinishedWithErrors {
                errors: stats.total_errors(),
            },
            None => LoopOutcome::Finished,
        };
        let elapsed_ms = match (self.job_ended, self.start_time) {
            (false, Some(start)) => start.elapsed().as_millis() as u64,
            _ => self.elapsed_ms,
        };

        LoopReport {
            outcome,
            state: self.state(),
            gate: self.config.gate,
            source: self.source.name().to_string(),
            record_type: self.source.declared_record_type(),
            supplied: self.source.supplied(),
            stats,
            started_at: self.started_at,
            elapsed_ms,
        }
    }

    fn drive(&mut self) {
        self.command_tx = None;
        loop {
            if let Control::Stop = self.next_control() {
                log::info!("[Loop] Stop requested");
                self.set_state(LoopState::Stopping);
                break;
            }

            if let Some(limit) = self.config.record_limit() {
                if self.next_sequence >= limit {
                    log::info!("[Loop] Record limit {} reached", limit);
                    break;
                }
            }

            if let Next::Finish = self.pull_one() {
                break;
            }
        }
    }

    /// Apply pending commands; blocks while paused
    fn next_control(&mut self) -> Control {
        while let Ok(command) = self.command_rx.try_recv() {
            if let Some(control) = self.apply(command) {
                return control;
            }
        }

        while self.state() == LoopState::Paused {
            match self.command_rx.recv() {
                Ok(command) => {
                    if let Some(control) = self.apply(command) {
                        return control;
                    }
                }
                Err(_) => {
                    log::warn!("[Loop] All handles dropped while paused");
                    return Control::Stop;
                }
            }
        }
        Control::Proceed
    }

    fn apply(&mut self, command: LoopCommand) -> Option<Control> {
        match command {
            LoopCommand::Stop => Some(Control::Stop),
            LoopCommand::Pause => {
                if self.state() == LoopState::Running {
                    log::info!("[Loop] Paused before sequence {}", self.next_sequence);
                    self.set_state(LoopState::Paused);
                }
                None
            }
            LoopCommand::Resume => {
                if self.state() == LoopState::Paused {
                    log::info!("[Loop] Resumed");
                    self.set_state(LoopState::Running);
                }
                None
            }
            LoopCommand::Step if self.state() == LoopState::Paused => Some(Control::Proceed),
            LoopCommand::Step => None,
        }
    }

    /// Pull, promote and dispatch one record
    fn pull_one(&mut self) -> Next {
        let mut composite = CompositeRecord::new(self.next_sequence);
        let attached = match self.source.next() {
            Ok(Pull::Raw(raw)) => composite.attach_raw(raw),
            Ok(Pull::Structured(record)) => composite.attach_structured(Arc::new(record)),
            Ok(Pull::Idle) => return Next::Continue,
            Ok(Pull::Exhausted) => {
                log::info!("[Loop] Source '{}' exhausted", self.source.name());
                return Next::Finish;
            }
            Err(e) => {
                log::error!("[Loop] Source '{}' failed: {}", self.source.name(), e);
                LoopStats::bump(&self.stats.source_errors);
                if self.config.stop_on_error {
                    self.abort = Some(Abort {
                        sequence: self.next_sequence.checked_sub(1),
                        reason: e.to_string(),
                    });
                    return Next::Finish;
                }
                return if e.is_fatal() {
                    Next::Finish
                } else {
                    Next::Continue
                };
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        LoopStats::bump(&self.stats.records_pulled);
        if let Err(e) = attached {
            log::error!("[Loop] Record {} rejected: {}", sequence, e);
            return Next::Continue;
        }

        let report = self.adapter.promote(&mut composite);
        let promotion_failed = self.account(&composite, &report);

        match self.dispatch(&composite) {
            Dispatch::Continue => {}
            Dispatch::Skipped { processor, stage } => {
                log::debug!(
                    "[Loop] {} processor '{}' skipped record {}",
                    stage,
                    processor,
                    sequence
                );
                LoopStats::bump(&self.stats.skipped_records);
            }
            Dispatch::Failed(failure) => {
                log::error!("[Loop] Record {}: {}", sequence, failure);
                LoopStats::bump(&self.stats.processing_errors);
                if self.config.stop_on_error {
                    return self.abort_at(sequence, &failure);
                }
            }
        }

        if let Some(reason) = promotion_failed {
            if self.config.stop_on_error {
                log::error!("[Loop] Aborting at record {}", sequence);
                self.abort = Some(Abort {
                    sequence: Some(sequence),
                    reason,
                });
                return Next::Finish;
            }
        }

        if self.config.stop_on_end_run && self.kind_of(&composite) == Some(RecordKind::RunEnd) {
            log::info!("[Loop] Run ended at record {}", sequence);
            return Next::Finish;
        }

        Next::Continue
    }

    /// Update counters for one promoted record; returns the promotion failure, if any
    fn account(&self, composite: &CompositeRecord, report: &PromotionReport) -> Option<String> {
        let sequence = composite.sequence();
        let failure = match report {
            PromotionReport::Failed { stage, error } => {
                log::warn!(
                    "[Adapter] Record {} not promoted to {}: {}",
                    sequence,
                    stage,
                    error
                );
                if error.is_transport() {
                    LoopStats::bump(&self.stats.transport_errors);
                } else {
                    LoopStats::bump(&self.stats.promotion_errors);
                }
                Some(error.to_string())
            }
            PromotionReport::Pending => {
                LoopStats::bump(&self.stats.fragments_buffered);
                None
            }
            _ => None,
        };

        if composite.has(Stage::Structured) {
            LoopStats::bump(&self.stats.structured_records);
        }
        if composite.has(Stage::Domain) {
            LoopStats::bump(&self.stats.domain_events);
        }
        if !matches!(report, PromotionReport::Pending) {
            if let Some(kind) = self.kind_of(composite) {
                if kind == RecordKind::Unrecognized {
                    log::debug!("[Loop] Record {} unrecognized, dropped", sequence);
                }
                self.stats.record_kind(kind);
            }
        }
        failure
    }

    fn kind_of(&self, composite: &CompositeRecord) -> Option<RecordKind> {
        composite
            .structured()
            .map(|record| record.kind())
            .or_else(|| composite.raw().map(|raw| self.adapter.classify(raw.tag)))
    }

    /// Dispatch every populated stage the gate permits, in stage order
    fn dispatch(&mut self, composite: &CompositeRecord) -> Dispatch {
        let gate = self.config.gate;

        if let Some(raw) = composite.raw() {
            let kind = self.adapter.classify(raw.tag);
            match self.processors.transport.dispatch(kind, raw) {
                Dispatch::Continue => {}
                other => return other,
            }
        }

        if gate.permits(Stage::Structured) {
            if let Some(record) = composite.structured() {
                match self.processors.structured.dispatch(record.kind(), record) {
                    Dispatch::Continue => {}
                    other => return other,
                }
            }
        }

        if gate.permits(Stage::Domain) {
            if let Some(event) = composite.domain() {
                return self.processors.domain.dispatch(event.kind, event);
            }
        }

        Dispatch::Continue
    }

    fn abort_at(&mut self, sequence: u64, failure: &ProcessorFailure) -> Next {
        log::error!("[Loop] Aborting at record {}", sequence);
        self.abort = Some(Abort {
            sequence: Some(sequence),
            reason: failure.to_string(),
        });
        Next::Finish
    }

    /// End the job exactly once and settle the terminal state
    fn end_job(&mut self) {
        if self.job_ended {
            return;
        }
        self.job_ended = true;

        for failure in self.processors.end_job(self.config.gate) {
            log::error!("[Loop] {}", failure);
            LoopStats::bump(&self.stats.processing_errors);
        }
        self.source.close();

        self.elapsed_ms = self
            .start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let state = if self.abort.is_some() {
            LoopState::Error
        } else {
            LoopState::Finished
        };
        self.set_state(state);

        let report = self.report();
        log::info!(
            "[Loop] Job {}: {} records pulled in {} ms",
            report.outcome,
            report.stats.records_pulled,
            report.elapsed_ms
        );
    }
}

impl std::fmt::Debug for RecordLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLoop")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("source", &self.source.name())
            .field("adapter", &self.adapter)
            .field("processors", &self.processors)
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}
