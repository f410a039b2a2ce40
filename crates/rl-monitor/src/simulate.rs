//! Synthetic record streams shaped like a real acquisition

use chrono::Utc;
use rl_ingest::encode_banks;
use rl_record::{
    Bank, FragmentInfo, RawRecord, END_TAG, EVENT_ID_BANK_TAG, GO_TAG, PRESTART_TAG, SYNC_TAG,
};

/// Bank tags carried by every synthetic readout
pub const HIT_BANK_TAG: u16 = 0x0E10;
pub const TRIGGER_BANK_TAG: u16 = 0x0E20;

/// Shape of a synthetic stream
#[derive(Debug, Clone)]
pub struct StreamShape {
    pub runs: u32,
    pub first_run: u32,
    pub events_per_run: u32,
    /// Fragments per readout (1 = unfragmented)
    pub fragments: u16,
    /// Replace every n-th readout with an unreadable payload (0 = never)
    pub corrupt_every: u32,
}

impl Default for StreamShape {
    fn default() -> Self {
        Self {
            runs: 1,
            first_run: 1000,
            events_per_run: 100,
            fragments: 1,
            corrupt_every: 0,
        }
    }
}

impl StreamShape {
    /// Every record of the stream in transport order
    pub fn records(&self) -> impl Iterator<Item = RawRecord> + '_ {
        (0..self.runs).flat_map(move |i| self.run(self.first_run + i))
    }

    /// Prestart, Go, readouts, a periodic Sync and End for one run
    pub fn run(&self, run_number: u32) -> Vec<RawRecord> {
        let now = Utc::now().timestamp() as u32;
        let mut records = vec![
            control(PRESTART_TAG, &[now, run_number, 1]),
            control(GO_TAG, &[now, 0]),
        ];

        for event in 1..=self.events_per_run {
            if self.corrupt_every > 0 && event % self.corrupt_every == 0 {
                records.push(RawRecord::new(1, vec![0xFF; 5]));
            } else {
                records.extend(self.readout(run_number, event));
            }
            if event % 1000 == 0 {
                records.push(control(SYNC_TAG, &[now, event]));
            }
        }

        records.push(control(END_TAG, &[now, self.events_per_run]));
        records
    }

    fn readout(&self, run_number: u32, event: u32) -> Vec<RawRecord> {
        let tag = 1 + (event % 4) as u16;
        let hits: Vec<u32> = (0..(event % 7 + 1)).map(|h| event * 16 + h).collect();
        let banks = vec![
            Bank::from_words(EVENT_ID_BANK_TAG, &[event, run_number]),
            Bank::from_words(TRIGGER_BANK_TAG, &[u32::from(tag)]),
            Bank::from_words(HIT_BANK_TAG, &hits),
        ];

        let count = self.fragments.max(1);
        if count == 1 {
            return vec![RawRecord::new(tag, encode_banks(&banks))];
        }

        let trigger = (u64::from(run_number) << 32) | u64::from(event);
        let mut parts: Vec<Vec<Bank>> = vec![Vec::new(); usize::from(count)];
        for (i, bank) in banks.into_iter().enumerate() {
            parts[i % usize::from(count)].push(bank);
        }
        parts
            .into_iter()
            .enumerate()
            .map(|(index, banks)| {
                RawRecord::new(tag, encode_banks(&banks))
                    .with_fragment(FragmentInfo::new(trigger, index as u16, count))
            })
            .collect()
    }
}

fn control(tag: u16, words: &[u32]) -> RawRecord {
    RawRecord::new(tag, encode_banks(&[Bank::from_words(tag, words)]))
}
