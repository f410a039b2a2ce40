//! Error types for the record loop

use rl_ingest::{AdapterError, TransportError};
use thiserror::Error;

use crate::driver::LoopState;

/// Enqueue on a closed queue
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
}

/// A record source that cannot continue
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed structured record on line {line}: {message}")]
    Json { line: usize, message: String },
}

impl SourceError {
    /// Whether the source lost its position and cannot be pulled again
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Json { .. })
    }
}

/// A processor failed during a lifecycle call
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl ProcessingError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Record loop errors
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LoopState,
    },

    #[error("Loop is gone")]
    Disconnected,

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for loop operations
pub type LoopResult<T> = Result<T, LoopError>;
