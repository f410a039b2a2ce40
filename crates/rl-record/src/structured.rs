//! StructuredRecord — A raw record parsed into banks with a recognized kind
//!
//! Structured records are immutable once built: fields are private and only
//! readable through accessors.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Structural classification of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Opens a run (acquisition period)
    RunStart,
    /// Closes a run
    RunEnd,
    /// Regular trigger data between run boundaries
    SteadyState,
    /// Control or foreign record the loop does not act on
    Unrecognized,
}

impl RecordKind {
    pub fn is_run_boundary(&self) -> bool {
        matches!(self, Self::RunStart | Self::RunEnd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::RunEnd => "run_end",
            Self::SteadyState => "steady_state",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One tagged sub-record of a structured record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub tag: u16,
    pub data: Vec<u8>,
}

impl Bank {
    pub fn new(tag: u16, data: Vec<u8>) -> Self {
        Self { tag, data }
    }

    /// Build a bank from 32-bit words (little-endian on the wire)
    pub fn from_words(tag: u16, words: &[u32]) -> Self {
        let data = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self { tag, data }
    }

    /// Data interpreted as little-endian 32-bit words; trailing bytes are ignored
    pub fn words(&self) -> Vec<u32> {
        self.data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn first_word(&self) -> Option<u32> {
        self.data
            .get(..4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

/// Run boundary details carried by RunStart/RunEnd records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run number (RunStart only)
    #[serde(default)]
    pub run_number: Option<u32>,

    /// Run type (RunStart only)
    #[serde(default)]
    pub run_type: Option<u32>,

    /// Events recorded in the run (RunEnd only)
    #[serde(default)]
    pub event_count: Option<u32>,

    /// Wall-clock time of the boundary
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RunInfo {
    /// Decode `[unix_time, run_number, run_type]`
    pub fn from_start_words(words: &[u32]) -> Self {
        Self {
            timestamp: words.first().and_then(|t| unix_time(*t)),
            run_number: words.get(1).copied(),
            run_type: words.get(2).copied(),
            event_count: None,
        }
    }

    /// Decode `[unix_time, event_count]`
    pub fn from_end_words(words: &[u32]) -> Self {
        Self {
            timestamp: words.first().and_then(|t| unix_time(*t)),
            run_number: None,
            run_type: None,
            event_count: words.get(1).copied(),
        }
    }
}

fn unix_time(secs: u32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::from(secs), 0).single()
}

/// Parsed domain record with recognized banks and markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    tag: u16,
    kind: RecordKind,
    event_number: Option<u64>,
    run: Option<RunInfo>,
    banks: Vec<Bank>,
    fragments: u16,
}

impl StructuredRecord {
    /// Create a record assembled from a single raw record
    pub fn new(tag: u16, kind: RecordKind, banks: Vec<Bank>) -> Self {
        Self {
            tag,
            kind,
            event_number: None,
            run: None,
            banks,
            fragments: 1,
        }
    }

    pub fn with_event_number(mut self, event_number: u64) -> Self {
        self.event_number = Some(event_number);
        self
    }

    pub fn with_run_info(mut self, run: RunInfo) -> Self {
        self.run = Some(run);
        self
    }

    /// Record how many raw fragments were merged into this record
    pub fn with_fragments(mut self, fragments: u16) -> Self {
        self.fragments = fragments.max(1);
        self
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn event_number(&self) -> Option<u64> {
        self.event_number
    }

    pub fn run_info(&self) -> Option<&RunInfo> {
        self.run.as_ref()
    }

    /// Banks in readout order
    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    /// First bank with the given tag
    pub fn bank(&self, tag: u16) -> Option<&Bank> {
        self.banks.iter().find(|b| b.tag == tag)
    }

    pub fn fragments(&self) -> u16 {
        self.fragments
    }
}
