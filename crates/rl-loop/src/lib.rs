//! # rl-loop — Record Loop
//!
//! Drives records from a source through staged promotion and the processor
//! chains of each stage, under a job/run/event lifecycle.
//!
//! ## Data flow
//!
//! ```text
//! RecordSource ──► (RecordQueue) ──► RecordLoop ──► StageAdapter
//!                                        │
//!                                        ├─► transport processors  (RawRecord)
//!                                        ├─► structured processors (StructuredRecord)
//!                                        └─► domain processors     (DomainEvent)
//! ```
//!
//! The same loop serves live input through a [`RecordQueue`] fed by a
//! producer thread and static input from a framed file.

pub mod config;
pub mod driver;
pub mod error;
pub mod processor;
pub mod queue;
pub mod source;
pub mod stats;

pub use config::*;
pub use driver::*;
pub use error::*;
pub use processor::*;
pub use queue::*;
pub use source::*;
pub use stats::*;
