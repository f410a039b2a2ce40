//! # rl-record — Record model for the staged processing loop
//!
//! Every datum flowing through the loop is one of three records, each a
//! further promotion of the previous one:
//!
//! - [`RawRecord`] - opaque transport datum as delivered by the DAQ transport
//! - [`StructuredRecord`] - parsed banks with a recognized [`RecordKind`]
//! - [`DomainEvent`] - fully resolved event built from a structured record
//!
//! A [`CompositeRecord`] bundles whatever a single pull produced, keyed by a
//! sequence number assigned when the raw record was pulled.

pub mod composite;
pub mod domain;
pub mod raw;
pub mod structured;
pub mod tags;

pub use composite::*;
pub use domain::*;
pub use raw::*;
pub use structured::*;
pub use tags::*;
