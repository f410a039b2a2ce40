//! DomainEvent — The fully resolved event produced by deep promotion

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::structured::RecordKind;

/// Fully resolved detector event
///
/// Run boundaries promote to header-only events (no collections) so that the
/// domain stage sees the same run lifecycle as the structured stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Kind of the structured record this event was built from
    pub kind: RecordKind,

    /// Run the event belongs to, if a RunStart has been seen
    #[serde(default)]
    pub run_number: Option<u32>,

    /// Trigger event number
    #[serde(default)]
    pub event_number: Option<u64>,

    /// Header tag of the originating record
    pub trigger_tag: u16,

    /// Decoded collections keyed by bank tag
    #[serde(default)]
    pub collections: BTreeMap<u16, Vec<u32>>,
}

impl DomainEvent {
    pub fn new(kind: RecordKind, trigger_tag: u16) -> Self {
        Self {
            kind,
            run_number: None,
            event_number: None,
            trigger_tag,
            collections: BTreeMap::new(),
        }
    }

    pub fn with_run(mut self, run_number: Option<u32>) -> Self {
        self.run_number = run_number;
        self
    }

    pub fn with_event_number(mut self, event_number: Option<u64>) -> Self {
        self.event_number = event_number;
        self
    }

    /// Add (or extend) a collection
    pub fn add_collection(&mut self, tag: u16, words: Vec<u32>) {
        self.collections.entry(tag).or_default().extend(words);
    }

    pub fn collection(&self, tag: u16) -> Option<&[u32]> {
        self.collections.get(&tag).map(|c| c.as_slice())
    }

    pub fn is_physics(&self) -> bool {
        self.kind == RecordKind::SteadyState
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collections_extend() {
        let mut event = DomainEvent::new(RecordKind::SteadyState, 1)
            .with_run(Some(10))
            .with_event_number(Some(5));
        event.add_collection(7, vec![1, 2]);
        event.add_collection(7, vec![3]);

        assert!(event.is_physics());
        assert_eq!(event.collection(7), Some(&[1, 2, 3][..]));
        assert_eq!(event.collection(8), None);
        assert_eq!(event.run_number, Some(10));
    }
}
