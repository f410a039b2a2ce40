//! CompositeRecord — Everything one pull produced, across pipeline stages

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DomainEvent;
use crate::raw::RawRecord;
use crate::structured::StructuredRecord;

/// Pipeline stage a record (and its processors) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transport,
    Structured,
    Domain,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Transport, Stage::Structured, Stage::Domain];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Structured => "structured",
            Self::Domain => "domain",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Violations of the left-to-right population rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    #[error("{0} record already attached")]
    AlreadyAttached(Stage),

    #[error("cannot attach {stage} record after {later} record")]
    OutOfOrder { stage: Stage, later: Stage },
}

/// Per-pull bundle of records
///
/// Fields fill left to right (raw, structured, domain) and are never cleared.
/// A record may start at the structured stage when the source supplies
/// already-parsed records, but nothing is ever attached to the left of a
/// populated field.
#[derive(Debug)]
pub struct CompositeRecord {
    sequence: u64,
    raw: Option<RawRecord>,
    structured: Option<Arc<StructuredRecord>>,
    domain: Option<DomainEvent>,
}

impl CompositeRecord {
    /// Create an empty composite for the given pull sequence number
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            raw: None,
            structured: None,
            domain: None,
        }
    }

    /// Sequence number assigned at pull time
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn attach_raw(&mut self, raw: RawRecord) -> Result<(), CompositeError> {
        self.check_slot(Stage::Transport)?;
        self.raw = Some(raw);
        Ok(())
    }

    pub fn attach_structured(
        &mut self,
        structured: Arc<StructuredRecord>,
    ) -> Result<(), CompositeError> {
        self.check_slot(Stage::Structured)?;
        self.structured = Some(structured);
        Ok(())
    }

    pub fn attach_domain(&mut self, domain: DomainEvent) -> Result<(), CompositeError> {
        self.check_slot(Stage::Domain)?;
        self.domain = Some(domain);
        Ok(())
    }

    pub fn raw(&self) -> Option<&RawRecord> {
        self.raw.as_ref()
    }

    pub fn structured(&self) -> Option<&StructuredRecord> {
        self.structured.as_deref()
    }

    pub fn domain(&self) -> Option<&DomainEvent> {
        self.domain.as_ref()
    }

    /// Whether the record for `stage` is present
    pub fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::Transport => self.raw.is_some(),
            Stage::Structured => self.structured.is_some(),
            Stage::Domain => self.domain.is_some(),
        }
    }

    /// Deepest stage populated so far
    pub fn depth(&self) -> Option<Stage> {
        Stage::ALL.iter().rev().copied().find(|s| self.has(*s))
    }

    fn check_slot(&self, stage: Stage) -> Result<(), CompositeError> {
        if self.has(stage) {
            return Err(CompositeError::AlreadyAttached(stage));
        }
        if let Some(later) = self.depth().filter(|d| *d > stage) {
            return Err(CompositeError::OutOfOrder { stage, later });
        }
        Ok(())
    }
}
