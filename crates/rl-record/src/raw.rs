//! RawRecord — A transport-level datum before any parsing

use serde::{Deserialize, Serialize};

/// Position of a raw record inside a multi-fragment readout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentInfo {
    /// Trigger number shared by all fragments of one readout
    pub trigger: u64,
    /// Fragment index (0-based)
    pub index: u16,
    /// Total number of fragments in the readout
    pub count: u16,
}

impl FragmentInfo {
    pub fn new(trigger: u64, index: u16, count: u16) -> Self {
        Self {
            trigger,
            index,
            count,
        }
    }

    /// A fragment count of one means the readout is complete by itself
    pub fn is_single(&self) -> bool {
        self.count == 1
    }
}

/// Unparsed record as delivered by the transport
///
/// The payload is opaque at this layer. Ownership moves with the record:
/// whichever stage holds it owns it until the record is dropped.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Structural header tag (control or physics)
    pub tag: u16,

    /// Fragment position for multi-fragment readouts
    #[serde(default)]
    pub fragment: Option<FragmentInfo>,

    /// Opaque payload bytes
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl RawRecord {
    /// Create a single-fragment raw record
    pub fn new(tag: u16, payload: Vec<u8>) -> Self {
        Self {
            tag,
            fragment: None,
            payload,
        }
    }

    /// Mark this record as one fragment of a larger readout
    pub fn with_fragment(mut self, fragment: FragmentInfo) -> Self {
        self.fragment = Some(fragment);
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True when this record needs assembly with sibling fragments
    pub fn is_fragment(&self) -> bool {
        self.fragment.is_some_and(|f| !f.is_single())
    }
}
