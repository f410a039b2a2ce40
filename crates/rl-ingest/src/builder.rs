//! Deep promotion — building domain events from structured records

use rl_record::{DomainEvent, RecordKind, StructuredRecord, EVENT_ID_BANK_TAG};

use crate::adapter::PromotionError;

/// Builds a domain event from a structured record
///
/// Builders only see run starts, run ends and steady-state records; the
/// adapter never hands them unrecognized records.
pub trait EventBuilder: Send {
    /// Builder name for diagnostics
    fn name(&self) -> &str;

    /// Build the domain event for `record` inside run `run_number`
    fn build(
        &mut self,
        record: &StructuredRecord,
        run_number: Option<u32>,
    ) -> Result<DomainEvent, PromotionError>;
}

/// Default builder: every bank becomes a word collection keyed by its tag
pub struct BankEventBuilder {
    id_bank_tag: u16,
    require_event_number: bool,
}

impl Default for BankEventBuilder {
    fn default() -> Self {
        Self {
            id_bank_tag: EVENT_ID_BANK_TAG,
            require_event_number: false,
        }
    }
}

impl BankEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank excluded from the collections because it only carries the event number
    pub fn with_id_bank_tag(mut self, tag: u16) -> Self {
        self.id_bank_tag = tag;
        self
    }

    /// Refuse steady-state records that carry no event number
    pub fn require_event_number(mut self, required: bool) -> Self {
        self.require_event_number = required;
        self
    }
}

impl EventBuilder for BankEventBuilder {
    fn name(&self) -> &str {
        "bank-event-builder"
    }

    fn build(
        &mut self,
        record: &StructuredRecord,
        run_number: Option<u32>,
    ) -> Result<DomainEvent, PromotionError> {
        let mut event = DomainEvent::new(record.kind(), record.tag())
            .with_run(run_number)
            .with_event_number(record.event_number());

        if record.kind() != RecordKind::SteadyState {
            return Ok(event);
        }

        if self.require_event_number && record.event_number().is_none() {
            return Err(PromotionError::Build(format!(
                "record with tag {} has no event number",
                record.tag()
            )));
        }

        for bank in record.banks().iter().filter(|b| b.tag != self.id_bank_tag) {
            if bank.data.len() % 4 != 0 {
                return Err(PromotionError::Build(format!(
                    "bank {} holds {} bytes, not a whole number of words",
                    bank.tag,
                    bank.data.len()
                )));
            }
            event.add_collection(bank.tag, bank.words());
        }

        Ok(event)
    }
}
