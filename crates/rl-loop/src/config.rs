//! Loop configuration — TOML-loadable settings passed to the loop at construction

use std::path::Path;
use std::time::Duration;

use rl_ingest::{AdapterConfig, ProcessingGate};
use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult};

/// Record-count limit meaning "no limit"
pub const UNBOUNDED: i64 = -1;

/// Loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// How deep records are promoted
    pub gate: ProcessingGate,

    /// Abort on the first processing or promotion failure
    pub stop_on_error: bool,

    /// Longest a single pull waits before the loop checks for commands
    pub dequeue_timeout_ms: u64,

    /// Records to pull before finishing (-1 = unbounded)
    pub max_records: i64,

    /// Finish after the first run end
    pub stop_on_end_run: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            gate: ProcessingGate::Domain,
            stop_on_error: false,
            dequeue_timeout_ms: 100,
            max_records: UNBOUNDED,
            stop_on_end_run: false,
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: ProcessingGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_dequeue_timeout_ms(mut self, ms: u64) -> Self {
        self.dequeue_timeout_ms = ms;
        self
    }

    pub fn with_max_records(mut self, max: i64) -> Self {
        self.max_records = max;
        self
    }

    pub fn with_stop_on_end_run(mut self, stop: bool) -> Self {
        self.stop_on_end_run = stop;
        self
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Record limit, `None` when unbounded
    pub fn record_limit(&self) -> Option<u64> {
        u64::try_from(self.max_records).ok()
    }

    pub fn validate(&self) -> LoopResult<()> {
        if self.max_records < UNBOUNDED {
            return Err(LoopError::Config(format!(
                "max_records must be -1 or a record count, got {}",
                self.max_records
            )));
        }
        if self.dequeue_timeout_ms == 0 {
            return Err(LoopError::Config(
                "dequeue_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete pipeline configuration: `[loop]` and `[adapter]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(rename = "loop")]
    pub loop_config: LoopConfig,
    pub adapter: AdapterConfig,
}

impl PipelineConfig {
    /// Load from TOML string
    pub fn from_toml(toml_str: &str) -> LoopResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| LoopError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> LoopResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Save to TOML string
    pub fn to_toml(&self) -> LoopResult<String> {
        toml::to_string_pretty(self).map_err(|e| LoopError::Config(e.to_string()))
    }

    pub fn validate(&self) -> LoopResult<()> {
        self.loop_config.validate()?;
        self.adapter.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.gate, ProcessingGate::Domain);
        assert!(!config.stop_on_error);
        assert_eq!(config.record_limit(), None);
        assert!(config.validate().is_ok());
        assert_eq!(LoopConfig::new().with_max_records(10).record_limit(), Some(10));
    }

    #[test]
    fn test_validation() {
        assert!(LoopConfig::new().with_max_records(-2).validate().is_err());
        assert!(LoopConfig::new().with_dequeue_timeout_ms(0).validate().is_err());
        assert!(LoopConfig::new().with_max_records(0).validate().is_ok());
    }

    #[test]
    fn test_pipeline_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [loop]
            gate = "structured_only"
            stop_on_error = true
            max_records = 500

            [adapter]
            max_pending_readouts = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.loop_config.gate, ProcessingGate::StructuredOnly);
        assert!(config.loop_config.stop_on_error);
        assert_eq!(config.loop_config.max_records, 500);
        assert_eq!(config.loop_config.dequeue_timeout_ms, 100);
        assert_eq!(config.adapter.max_pending_readouts, 8);
        assert_eq!(config.adapter.run_start_tag, 17);

        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_pipeline_rejected() {
        assert!(PipelineConfig::from_toml("[loop]\nmax_records = -5\n").is_err());
        assert!(PipelineConfig::from_toml("[adapter]\nmax_pending_readouts = 0\n").is_err());
        assert!(PipelineConfig::from_toml("[loop]\ngate = \"everything\"\n").is_err());
    }
}
