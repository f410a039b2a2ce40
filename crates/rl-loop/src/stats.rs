//! Loop statistics — lock-free counters readable while the loop runs

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rl_ingest::ProcessingGate;
use rl_record::RecordKind;
use serde::{Deserialize, Serialize};

use crate::driver::LoopState;
use crate::source::RecordType;

/// Live counters shared between the loop and its handles
#[derive(Debug, Default)]
pub struct LoopStats {
    pub records_pulled: AtomicU64,
    pub structured_records: AtomicU64,
    pub domain_events: AtomicU64,
    pub run_starts: AtomicU64,
    pub run_ends: AtomicU64,
    pub steady_state: AtomicU64,
    pub unrecognized: AtomicU64,
    pub fragments_buffered: AtomicU64,
    pub transport_errors: AtomicU64,
    pub promotion_errors: AtomicU64,
    pub processing_errors: AtomicU64,
    pub source_errors: AtomicU64,
    pub skipped_records: AtomicU64,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_kind(&self, kind: RecordKind) {
        Self::bump(match kind {
            RecordKind::RunStart => &self.run_starts,
            RecordKind::RunEnd => &self.run_ends,
            RecordKind::SteadyState => &self.steady_state,
            RecordKind::Unrecognized => &self.unrecognized,
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            records_pulled: load(&self.records_pulled),
            structured_records: load(&self.structured_records),
            domain_events: load(&self.domain_events),
            run_starts: load(&self.run_starts),
            run_ends: load(&self.run_ends),
            steady_state: load(&self.steady_state),
            unrecognized: load(&self.unrecognized),
            fragments_buffered: load(&self.fragments_buffered),
            transport_errors: load(&self.transport_errors),
            promotion_errors: load(&self.promotion_errors),
            processing_errors: load(&self.processing_errors),
            source_errors: load(&self.source_errors),
            skipped_records: load(&self.skipped_records),
        }
    }
}

/// Point-in-time copy of [`LoopStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub records_pulled: u64,
    pub structured_records: u64,
    pub domain_events: u64,
    pub run_starts: u64,
    pub run_ends: u64,
    pub steady_state: u64,
    pub unrecognized: u64,
    pub fragments_buffered: u64,
    pub transport_errors: u64,
    pub promotion_errors: u64,
    pub processing_errors: u64,
    pub source_errors: u64,
    pub skipped_records: u64,
}

impl StatsSnapshot {
    /// Every failure the loop absorbed or acted on
    pub fn total_errors(&self) -> u64 {
        self.transport_errors + self.promotion_errors + self.processing_errors + self.source_errors
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    Finished,
    FinishedWithErrors { errors: u64 },
    /// Stopped by the error policy; `sequence` is `None` when no record was pulled
    Aborted { sequence: Option<u64>, reason: String },
}

impl LoopOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::FinishedWithErrors { errors } => write!(f, "finished with {} errors", errors),
            Self::Aborted {
                sequence: Some(sequence),
                reason,
            } => write!(f, "aborted at sequence {}: {}", sequence, reason),
            Self::Aborted {
                sequence: None,
                reason,
            } => write!(f, "aborted before the first record: {}", reason),
        }
    }
}

/// Final job report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub state: LoopState,
    pub gate: ProcessingGate,
    pub source: String,
    pub record_type: RecordType,
    pub supplied: Option<u64>,
    pub stats: StatsSnapshot,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
}

impl LoopReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
