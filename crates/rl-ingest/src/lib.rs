//! # rl-ingest — Stage Adapter
//!
//! Promotes raw transport records into structured records and, when the
//! processing gate allows it, into domain events.
//!
//! ## Promotion depths
//!
//! 1. **Structural** - decode banks, assemble fragments, classify the record
//!    as run start, run end, steady state or unrecognized
//! 2. **Deep** - additionally build a [`rl_record::DomainEvent`] through an
//!    [`EventBuilder`]
//!
//! Malformed records never escape as errors: the adapter absorbs them and
//! reports the failure so the loop can count it and carry on.

pub mod adapter;
pub mod assembler;
pub mod builder;
pub mod codec;
pub mod config;

pub use adapter::*;
pub use assembler::*;
pub use builder::*;
pub use codec::*;
pub use config::*;
