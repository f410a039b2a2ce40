//! Processors — per-stage logic with job/run/event lifecycle hooks
//!
//! Each stage owns an ordered [`ProcessorChain`]. The dispatcher picks the
//! hook from the record kind, so processors never classify records
//! themselves.

use rl_ingest::ProcessingGate;
use rl_record::{DomainEvent, RawRecord, RecordKind, Stage, StructuredRecord};
use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;

/// What the dispatcher does after a successful `process_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Hand the record to the next processor
    #[default]
    Continue,
    /// Stop dispatching this record without counting an error
    SkipRecord,
}

/// Unit of per-stage logic
///
/// `R` is the record type of the stage: [`RawRecord`], [`StructuredRecord`]
/// or [`DomainEvent`]. Hooks run on the loop thread and must not block.
pub trait Processor<R>: Send {
    /// Processor name for diagnostics
    fn name(&self) -> &str;

    fn start_job(&mut self) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn start_run(&mut self, _record: &R) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn process_event(&mut self, record: &R) -> Result<Flow, ProcessingError>;

    fn end_run(&mut self, _record: &R) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// Lifecycle hook names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    StartJob,
    StartRun,
    ProcessEvent,
    EndRun,
    EndJob,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartJob => "start_job",
            Self::StartRun => "start_run",
            Self::ProcessEvent => "process_event",
            Self::EndRun => "end_run",
            Self::EndJob => "end_job",
        }
    }

    /// Hook a record of `kind` is dispatched to
    pub fn for_kind(kind: RecordKind) -> Option<Self> {
        match kind {
            RecordKind::RunStart => Some(Self::StartRun),
            RecordKind::RunEnd => Some(Self::EndRun),
            RecordKind::SteadyState => Some(Self::ProcessEvent),
            RecordKind::Unrecognized => None,
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A processor error with the processor's identity
#[derive(Debug)]
pub struct ProcessorFailure {
    pub processor: String,
    pub stage: Stage,
    pub hook: Hook,
    pub error: ProcessingError,
}

impl std::fmt::Display for ProcessorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processor '{}' failed in {}: {}",
            self.stage, self.processor, self.hook, self.error
        )
    }
}

/// Result of dispatching one record through a chain
#[derive(Debug)]
pub enum Dispatch {
    Continue,
    Skipped { processor: String, stage: Stage },
    Failed(ProcessorFailure),
}

/// Ordered processors of one stage
pub struct ProcessorChain<R> {
    stage: Stage,
    processors: Vec<Box<dyn Processor<R>>>,
}

impl<R> std::fmt::Debug for ProcessorChain<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("stage", &self.stage)
            .field("processors", &self.names())
            .finish()
    }
}

impl<R> ProcessorChain<R> {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processors: Vec::new(),
        }
    }

    /// Append a processor; the same processor type may be added twice
    pub fn add<P: Processor<R> + 'static>(&mut self, processor: P) {
        self.processors.push(Box::new(processor));
    }

    pub fn add_boxed(&mut self, processor: Box<dyn Processor<R>>) {
        self.processors.push(processor);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run `start_job` in order, stopping at the first failure
    pub fn start_job(&mut self) -> Result<(), ProcessorFailure> {
        let stage = self.stage;
        for processor in &mut self.processors {
            processor
                .start_job()
                .map_err(|error| failure(stage, processor.name(), Hook::StartJob, error))?;
        }
        Ok(())
    }

    /// Run `end_job` on every processor, collecting failures
    pub fn end_job(&mut self) -> Vec<ProcessorFailure> {
        let stage = self.stage;
        self.processors
            .iter_mut()
            .filter_map(|processor| {
                processor
                    .end_job()
                    .err()
                    .map(|error| failure(stage, processor.name(), Hook::EndJob, error))
            })
            .collect()
    }

    /// Hand one record of `kind` to every processor in order
    ///
    /// Unrecognized records reach no processor. The first failure or skip
    /// ends dispatch of the record.
    pub fn dispatch(&mut self, kind: RecordKind, record: &R) -> Dispatch {
        let Some(hook) = Hook::for_kind(kind) else {
            return Dispatch::Continue;
        };

        for processor in &mut self.processors {
            let result = match kind {
                RecordKind::RunStart => processor.start_run(record).map(|()| Flow::Continue),
                RecordKind::RunEnd => processor.end_run(record).map(|()| Flow::Continue),
                _ => processor.process_event(record),
            };

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::SkipRecord) => {
                    return Dispatch::Skipped {
                        processor: processor.name().to_string(),
                        stage: self.stage,
                    }
                }
                Err(error) => {
                    return Dispatch::Failed(failure(self.stage, processor.name(), hook, error))
                }
            }
        }
        Dispatch::Continue
    }
}

fn failure(stage: Stage, processor: &str, hook: Hook, error: ProcessingError) -> ProcessorFailure {
    ProcessorFailure {
        processor: processor.to_string(),
        stage,
        hook,
        error,
    }
}

/// Processor chains of all three stages
#[derive(Debug)]
pub struct StageProcessors {
    pub transport: ProcessorChain<RawRecord>,
    pub structured: ProcessorChain<StructuredRecord>,
    pub domain: ProcessorChain<DomainEvent>,
}

impl Default for StageProcessors {
    fn default() -> Self {
        Self {
            transport: ProcessorChain::new(Stage::Transport),
            structured: ProcessorChain::new(Stage::Structured),
            domain: ProcessorChain::new(Stage::Domain),
        }
    }
}

impl StageProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processors taking part in a job under `gate`
    pub fn active_count(&self, gate: ProcessingGate) -> usize {
        let mut count = self.transport.len();
        if gate.permits(Stage::Structured) {
            count += self.structured.len();
        }
        if gate.permits(Stage::Domain) {
            count += self.domain.len();
        }
        count
    }

    /// Start the job on every stage the gate permits
    pub fn start_job(&mut self, gate: ProcessingGate) -> Result<(), ProcessorFailure> {
        self.transport.start_job()?;
        if gate.permits(Stage::Structured) {
            self.structured.start_job()?;
        }
        if gate.permits(Stage::Domain) {
            self.domain.start_job()?;
        }
        Ok(())
    }

    /// End the job on every stage the gate permits
    pub fn end_job(&mut self, gate: ProcessingGate) -> Vec<ProcessorFailure> {
        let mut failures = self.transport.end_job();
        if gate.permits(Stage::Structured) {
            failures.extend(self.structured.end_job());
        }
        if gate.permits(Stage::Domain) {
            failures.extend(self.domain.end_job());
        }
        failures
    }
}
