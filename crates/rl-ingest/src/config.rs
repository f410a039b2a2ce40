//! Adapter Configuration — TOML-based config for record classification

use rl_record::{END_TAG, EVENT_ID_BANK_TAG, PHYSICS_TAG_MAX, PHYSICS_TAG_MIN, PRESTART_TAG};
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterError, ProcessingGate};

/// Complete adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Header tag that opens a run
    #[serde(default = "default_prestart_tag")]
    pub run_start_tag: u16,

    /// Header tag that closes a run
    #[serde(default = "default_end_tag")]
    pub run_end_tag: u16,

    /// Header tags treated as steady-state trigger data
    #[serde(default)]
    pub physics_tags: TagRange,

    /// Bank whose first word is the event number
    #[serde(default = "default_event_id_bank_tag")]
    pub event_id_bank_tag: u16,

    /// Readouts allowed to wait for missing fragments at once
    #[serde(default = "default_max_pending_readouts")]
    pub max_pending_readouts: usize,
}

fn default_prestart_tag() -> u16 {
    PRESTART_TAG
}

fn default_end_tag() -> u16 {
    END_TAG
}

fn default_event_id_bank_tag() -> u16 {
    EVENT_ID_BANK_TAG
}

fn default_max_pending_readouts() -> usize {
    64
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            run_start_tag: default_prestart_tag(),
            run_end_tag: default_end_tag(),
            physics_tags: TagRange::default(),
            event_id_bank_tag: default_event_id_bank_tag(),
            max_pending_readouts: default_max_pending_readouts(),
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, AdapterError> {
        toml::from_str(toml_str).map_err(|e| AdapterError::Config(e.to_string()))
    }

    /// Save to TOML string
    pub fn to_toml(&self) -> Result<String, AdapterError> {
        toml::to_string_pretty(self).map_err(|e| AdapterError::Config(e.to_string()))
    }

    pub fn with_physics_tags(mut self, min: u16, max: u16) -> Self {
        self.physics_tags = TagRange { min, max };
        self
    }

    pub fn with_max_pending_readouts(mut self, max: usize) -> Self {
        self.max_pending_readouts = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.physics_tags.min > self.physics_tags.max {
            return Err(AdapterError::Config(format!(
                "physics tag range {}..={} is empty",
                self.physics_tags.min, self.physics_tags.max
            )));
        }
        if self.run_start_tag == self.run_end_tag {
            return Err(AdapterError::Config(
                "run start and run end tags must differ".to_string(),
            ));
        }
        for tag in [self.run_start_tag, self.run_end_tag] {
            if self.physics_tags.contains(tag) {
                return Err(AdapterError::Config(format!(
                    "run boundary tag {} overlaps the physics tag range",
                    tag
                )));
            }
        }
        if self.max_pending_readouts == 0 {
            return Err(AdapterError::Config(
                "max_pending_readouts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inclusive range of header tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRange {
    pub min: u16,
    pub max: u16,
}

impl Default for TagRange {
    fn default() -> Self {
        Self {
            min: PHYSICS_TAG_MIN,
            max: PHYSICS_TAG_MAX,
        }
    }
}

impl TagRange {
    pub fn contains(&self, tag: u16) -> bool {
        (self.min..=self.max).contains(&tag)
    }
}

// Serde support for ProcessingGate
impl Serialize for ProcessingGate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ProcessingGate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
