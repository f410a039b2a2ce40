//! Stage Adapter — promotes raw records as deep as the processing gate allows

use std::str::FromStr;
use std::sync::Arc;

use rl_record::{
    CompositeError, CompositeRecord, DomainEvent, RawRecord, RecordKind, RunInfo, Stage,
    StructuredRecord,
};
use thiserror::Error;

use crate::assembler::FragmentAssembler;
use crate::builder::{BankEventBuilder, EventBuilder};
use crate::codec::decode_banks;
use crate::config::AdapterConfig;

/// A raw record whose bytes cannot be parsed
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bank {tag} at offset {offset} declares {declared} bytes, {available} available")]
    TruncatedBank {
        tag: u16,
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("{len} trailing bytes at offset {offset} do not form a bank header")]
    TrailingBytes { offset: usize, len: usize },

    #[error("frame truncated, {declared} bytes declared")]
    TruncatedFrame { declared: usize },

    #[error("invalid frame length: {0}")]
    BadFrameLength(usize),

    #[error("unknown record flags: {0:#04x}")]
    UnknownFlags(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A record that parsed but cannot be classified, assembled or built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("fragment {index} of {count} is out of range for trigger {trigger}")]
    FragmentOutOfRange { trigger: u64, index: u16, count: u16 },

    #[error("trigger {trigger} expects {expected} fragments, fragment declares {got}")]
    FragmentCountMismatch { trigger: u64, expected: u16, got: u16 },

    #[error("trigger {trigger} started with tag {expected}, fragment has tag {got}")]
    FragmentTagMismatch { trigger: u64, expected: u16, got: u16 },

    #[error("duplicate fragment {index} for trigger {trigger}")]
    DuplicateFragment { trigger: u64, index: u16 },

    #[error("cannot buffer trigger {trigger}: {limit} readouts already pending")]
    TooManyPending { trigger: u64, limit: usize },

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("event build failed: {0}")]
    Build(String),

    #[error(transparent)]
    Composite(#[from] CompositeError),
}

/// Errors that can occur during adaptation
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("promotion error: {0}")]
    Promotion(#[from] PromotionError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// How deep records are promoted before processors see them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessingGate {
    /// Raw records only - throughput counting, forwarding
    TransportOnly,
    /// Raw and structured records
    StructuredOnly,
    /// Raw, structured and domain records
    #[default]
    Domain,
}

impl ProcessingGate {
    /// Whether processors of `stage` can receive records under this gate
    pub fn permits(&self, stage: Stage) -> bool {
        match self {
            Self::TransportOnly => stage == Stage::Transport,
            Self::StructuredOnly => stage <= Stage::Structured,
            Self::Domain => true,
        }
    }

    /// Deepest stage promotion proceeds to
    pub fn deepest(&self) -> Stage {
        match self {
            Self::TransportOnly => Stage::Transport,
            Self::StructuredOnly => Stage::Structured,
            Self::Domain => Stage::Domain,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TransportOnly => "transport_only",
            Self::StructuredOnly => "structured_only",
            Self::Domain => "domain",
        }
    }
}

impl FromStr for ProcessingGate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "transport_only" | "transport" => Ok(Self::TransportOnly),
            "structured_only" | "structured" => Ok(Self::StructuredOnly),
            "domain" | "deep" => Ok(Self::Domain),
            _ => Err(format!("unknown processing gate: {}", s)),
        }
    }
}

impl std::fmt::Display for ProcessingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of promoting one composite record
///
/// Failures are reported, never raised: the composite keeps whatever stages
/// were populated before the failure.
#[derive(Debug)]
pub enum PromotionReport {
    /// The gate stops at the transport stage
    Disabled,
    /// The composite holds nothing to promote
    Empty,
    /// Fragment buffered until the rest of its readout arrives
    Pending,
    /// Deepest stage reached
    Promoted(Stage),
    /// Promotion to `stage` failed
    Failed { stage: Stage, error: AdapterError },
}

impl PromotionReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Promotes raw records into structured records and domain events
pub struct StageAdapter {
    config: AdapterConfig,
    gate: ProcessingGate,
    assembler: FragmentAssembler,
    builder: Box<dyn EventBuilder>,
    current_run: Option<u32>,
}

impl StageAdapter {
    /// Create an adapter with the default bank event builder
    pub fn new(config: AdapterConfig, gate: ProcessingGate) -> Result<Self, AdapterError> {
        config.validate()?;
        let builder = BankEventBuilder::new().with_id_bank_tag(config.event_id_bank_tag);
        Ok(Self {
            assembler: FragmentAssembler::new(config.max_pending_readouts),
            builder: Box::new(builder),
            config,
            gate,
            current_run: None,
        })
    }

    /// Replace the deep-promotion builder
    pub fn with_builder(mut self, builder: Box<dyn EventBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn gate(&self) -> ProcessingGate {
        self.gate
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Run number of the most recent run start seen by deep promotion
    pub fn current_run(&self) -> Option<u32> {
        self.current_run
    }

    /// Readouts waiting for missing fragments
    pub fn pending_readouts(&self) -> usize {
        self.assembler.pending_count()
    }

    /// Classify a header tag
    pub fn classify(&self, tag: u16) -> RecordKind {
        if tag == self.config.run_start_tag {
            RecordKind::RunStart
        } else if tag == self.config.run_end_tag {
            RecordKind::RunEnd
        } else if self.config.physics_tags.contains(tag) {
            RecordKind::SteadyState
        } else {
            RecordKind::Unrecognized
        }
    }

    /// Promote a composite as deep as the gate allows
    pub fn promote(&mut self, composite: &mut CompositeRecord) -> PromotionReport {
        if !self.gate.permits(Stage::Structured) {
            return PromotionReport::Disabled;
        }

        if !composite.has(Stage::Structured) {
            let promoted = match composite.raw() {
                Some(raw) => self.promote_structural(raw),
                None => return PromotionReport::Empty,
            };
            match promoted {
                Ok(Some(record)) => {
                    if let Err(e) = composite.attach_structured(Arc::new(record)) {
                        return PromotionReport::Failed {
                            stage: Stage::Structured,
                            error: PromotionError::from(e).into(),
                        };
                    }
                }
                Ok(None) => return PromotionReport::Pending,
                Err(error) => {
                    return PromotionReport::Failed {
                        stage: Stage::Structured,
                        error,
                    }
                }
            }
        }

        if !self.gate.permits(Stage::Domain) {
            return PromotionReport::Promoted(Stage::Structured);
        }

        let built = match composite.structured() {
            Some(record) => self.promote_deep(record),
            None => return PromotionReport::Empty,
        };
        match built {
            Ok(Some(event)) => match composite.attach_domain(event) {
                Ok(()) => PromotionReport::Promoted(Stage::Domain),
                Err(e) => PromotionReport::Failed {
                    stage: Stage::Domain,
                    error: PromotionError::from(e).into(),
                },
            },
            Ok(None) => PromotionReport::Promoted(Stage::Structured),
            Err(e) => PromotionReport::Failed {
                stage: Stage::Domain,
                error: e.into(),
            },
        }
    }

    /// Structural promotion of one raw record
    ///
    /// Returns `Ok(None)` while a multi-fragment readout is incomplete.
    /// Unrecognized records are classified without decoding their payload.
    pub fn promote_structural(
        &mut self,
        raw: &RawRecord,
    ) -> Result<Option<StructuredRecord>, AdapterError> {
        let kind = self.classify(raw.tag);
        if kind == RecordKind::Unrecognized {
            return Ok(Some(StructuredRecord::new(raw.tag, kind, Vec::new())));
        }

        let banks = decode_banks(&raw.payload)?;

        let (tag, banks, fragments) = match raw.fragment {
            Some(fragment) => match self.assembler.offer(raw.tag, fragment, banks)? {
                Some(readout) => (readout.tag, readout.banks, readout.fragments),
                None => return Ok(None),
            },
            None => (raw.tag, banks, 1),
        };

        if kind.is_run_boundary() {
            let discarded = self.assembler.clear();
            if discarded > 0 {
                log::warn!(
                    "[Adapter] Discarded {} incomplete readouts at {}",
                    discarded,
                    kind
                );
            }
        }

        let mut record = StructuredRecord::new(tag, kind, banks).with_fragments(fragments);

        if let Some(number) = record
            .bank(self.config.event_id_bank_tag)
            .and_then(|b| b.first_word())
        {
            record = record.with_event_number(u64::from(number));
        }

        let boundary_words = record.banks().first().map(|b| b.words()).unwrap_or_default();
        record = match kind {
            RecordKind::RunStart => record.with_run_info(RunInfo::from_start_words(&boundary_words)),
            RecordKind::RunEnd => record.with_run_info(RunInfo::from_end_words(&boundary_words)),
            _ => record,
        };

        Ok(Some(record))
    }

    /// Deep promotion of one structured record
    ///
    /// Unrecognized records yield `Ok(None)`. Run starts update the current
    /// run number before the builder sees them.
    pub fn promote_deep(
        &mut self,
        record: &StructuredRecord,
    ) -> Result<Option<DomainEvent>, PromotionError> {
        match record.kind() {
            RecordKind::Unrecognized => return Ok(None),
            RecordKind::RunStart => {
                let run = record.run_info().and_then(|r| r.run_number);
                if run.is_some() && run != self.current_run {
                    log::info!("[Adapter] Run {:?} -> {:?}", self.current_run, run);
                }
                self.current_run = run;
            }
            RecordKind::RunEnd | RecordKind::SteadyState => {}
        }

        self.builder.build(record, self.current_run).map(Some)
    }
}

impl std::fmt::Debug for StageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageAdapter")
            .field("gate", &self.gate)
            .field("builder", &self.builder.name())
            .field("current_run", &self.current_run)
            .field("pending_readouts", &self.assembler.pending_count())
            .finish()
    }
}
