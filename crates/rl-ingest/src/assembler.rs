//! Fragment assembly for multi-fragment readouts
//!
//! A readout split across several raw records is buffered per trigger until
//! every fragment has arrived; the banks are then merged in fragment-index
//! order. Any inconsistency discards the partial readout.

use std::collections::{BTreeMap, HashMap};

use rl_record::{Bank, FragmentInfo};

use crate::adapter::PromotionError;

/// A completed readout
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledReadout {
    pub tag: u16,
    pub trigger: u64,
    pub fragments: u16,
    pub banks: Vec<Bank>,
}

struct PendingReadout {
    tag: u16,
    count: u16,
    parts: BTreeMap<u16, Vec<Bank>>,
}

/// Buffers fragments until each readout is complete
pub struct FragmentAssembler {
    pending: HashMap<u64, PendingReadout>,
    max_pending: usize,
}

impl FragmentAssembler {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Offer one fragment; returns the readout once its last fragment arrives
    pub fn offer(
        &mut self,
        tag: u16,
        fragment: FragmentInfo,
        banks: Vec<Bank>,
    ) -> Result<Option<AssembledReadout>, PromotionError> {
        let FragmentInfo {
            trigger,
            index,
            count,
        } = fragment;

        if count == 0 || index >= count {
            return Err(PromotionError::FragmentOutOfRange {
                trigger,
                index,
                count,
            });
        }

        if count == 1 {
            return Ok(Some(AssembledReadout {
                tag,
                trigger,
                fragments: 1,
                banks,
            }));
        }

        if !self.pending.contains_key(&trigger) && self.pending.len() >= self.max_pending {
            return Err(PromotionError::TooManyPending {
                trigger,
                limit: self.max_pending,
            });
        }

        let pending = self.pending.entry(trigger).or_insert_with(|| PendingReadout {
            tag,
            count,
            parts: BTreeMap::new(),
        });

        let conflict = if pending.count != count {
            Some(PromotionError::FragmentCountMismatch {
                trigger,
                expected: pending.count,
                got: count,
            })
        } else if pending.tag != tag {
            Some(PromotionError::FragmentTagMismatch {
                trigger,
                expected: pending.tag,
                got: tag,
            })
        } else if pending.parts.contains_key(&index) {
            Some(PromotionError::DuplicateFragment { trigger, index })
        } else {
            None
        };

        if let Some(err) = conflict {
            self.pending.remove(&trigger);
            return Err(err);
        }

        pending.parts.insert(index, banks);
        if pending.parts.len() < usize::from(pending.count) {
            return Ok(None);
        }

        let complete = self
            .pending
            .remove(&trigger)
            .ok_or(PromotionError::Assembly(format!(
                "readout {} vanished during assembly",
                trigger
            )))?;

        Ok(Some(AssembledReadout {
            tag: complete.tag,
            trigger,
            fragments: complete.count,
            banks: complete.parts.into_values().flatten().collect(),
        }))
    }

    /// Readouts still waiting for fragments
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every partial readout, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}
