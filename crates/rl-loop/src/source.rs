//! Record sources — where the loop pulls records from

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rl_ingest::read_record;
use rl_record::{RawRecord, StructuredRecord};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::queue::{Dequeue, RecordQueue};

/// Stage a source's records enter the pipeline at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Raw,
    Structured,
}

/// Outcome of one pull
#[derive(Debug)]
pub enum Pull {
    Raw(RawRecord),
    Structured(StructuredRecord),
    /// No record available right now
    Idle,
    /// No record will ever be available again
    Exhausted,
}

/// A sequence of records
pub trait RecordSource: Send {
    /// Source name for diagnostics
    fn name(&self) -> &str;

    /// Pull the next record
    fn next(&mut self) -> Result<Pull, SourceError>;

    /// Stage the records of this source enter at
    fn declared_record_type(&self) -> RecordType;

    /// Records handed to the loop so far, when the source keeps count
    fn supplied(&self) -> Option<u64> {
        None
    }

    /// Longest a single pull may wait before returning `Pull::Idle`
    fn set_poll_timeout(&mut self, _timeout: Duration) {}

    /// Release the underlying transport
    fn close(&mut self) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

enum Buffered {
    Raw(VecDeque<RawRecord>),
    Structured(VecDeque<StructuredRecord>),
}

/// Source over records already in memory
pub struct MemorySource {
    records: Buffered,
    supplied: u64,
}

impl MemorySource {
    pub fn raw(records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self {
            records: Buffered::Raw(records.into_iter().collect()),
            supplied: 0,
        }
    }

    pub fn structured(records: impl IntoIterator<Item = StructuredRecord>) -> Self {
        Self {
            records: Buffered::Structured(records.into_iter().collect()),
            supplied: 0,
        }
    }

    /// Records not yet pulled
    pub fn remaining(&self) -> usize {
        match &self.records {
            Buffered::Raw(records) => records.len(),
            Buffered::Structured(records) => records.len(),
        }
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn next(&mut self) -> Result<Pull, SourceError> {
        let pull = match &mut self.records {
            Buffered::Raw(records) => records.pop_front().map(Pull::Raw),
            Buffered::Structured(records) => records.pop_front().map(Pull::Structured),
        };
        Ok(match pull {
            Some(pull) => {
                self.supplied += 1;
                pull
            }
            None => Pull::Exhausted,
        })
    }

    fn declared_record_type(&self) -> RecordType {
        match self.records {
            Buffered::Raw(_) => RecordType::Raw,
            Buffered::Structured(_) => RecordType::Structured,
        }
    }

    fn supplied(&self) -> Option<u64> {
        Some(self.supplied)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAMED FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source reading length-framed raw records from a byte stream
///
/// A framing error leaves the stream position unknown, so the source reports
/// it once and is exhausted afterwards.
pub struct FramedSource<R: Read + Send> {
    reader: BufReader<R>,
    supplied: u64,
    done: bool,
}

impl FramedSource<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read + Send> FramedSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            supplied: 0,
            done: false,
        }
    }
}

impl<R: Read + Send> RecordSource for FramedSource<R> {
    fn name(&self) -> &str {
        "framed"
    }

    fn next(&mut self) -> Result<Pull, SourceError> {
        if self.done {
            return Ok(Pull::Exhausted);
        }
        match read_record(&mut self.reader) {
            Ok(Some(record)) => {
                self.supplied += 1;
                Ok(Pull::Raw(record))
            }
            Ok(None) => {
                self.done = true;
                Ok(Pull::Exhausted)
            }
            Err(e) => {
                self.done = true;
                Err(e.into())
            }
        }
    }

    fn declared_record_type(&self) -> RecordType {
        RecordType::Raw
    }

    fn supplied(&self) -> Option<u64> {
        Some(self.supplied)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON LINES
// ═══════════════════════════════════════════════════════════════════════════════

/// Source reading one JSON structured record per line
///
/// Blank lines are ignored. A malformed line is reported and skipped.
pub struct JsonLinesSource<R: BufRead + Send> {
    reader: R,
    line: usize,
    supplied: u64,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            supplied: 0,
        }
    }
}

impl<R: BufRead + Send> RecordSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn next(&mut self) -> Result<Pull, SourceError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf)? == 0 {
                return Ok(Pull::Exhausted);
            }
            self.line += 1;
            if !buf.trim().is_empty() {
                break;
            }
        }

        let record = serde_json::from_str(buf.trim()).map_err(|e| SourceError::Json {
            line: self.line,
            message: e.to_string(),
        })?;
        self.supplied += 1;
        Ok(Pull::Structured(record))
    }

    fn declared_record_type(&self) -> RecordType {
        RecordType::Structured
    }

    fn supplied(&self) -> Option<u64> {
        Some(self.supplied)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source fed by a producer thread through a [`RecordQueue`]
pub struct QueueSource {
    queue: Arc<RecordQueue>,
    timeout: Duration,
    supplied: u64,
}

impl QueueSource {
    pub fn new(queue: Arc<RecordQueue>) -> Self {
        Self {
            queue,
            timeout: Duration::from_millis(100),
            supplied: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &Arc<RecordQueue> {
        &self.queue
    }
}

impl RecordSource for QueueSource {
    fn name(&self) -> &str {
        "queue"
    }

    fn next(&mut self) -> Result<Pull, SourceError> {
        Ok(match self.queue.dequeue(self.timeout) {
            Dequeue::Record(entry) => {
                self.supplied += 1;
                log::trace!("[Queue] Record waited {:?}", entry.waited());
                Pull::Raw(entry.record)
            }
            Dequeue::TimedOut => Pull::Idle,
            Dequeue::Closed => Pull::Exhausted,
        })
    }

    fn declared_record_type(&self) -> RecordType {
        RecordType::Raw
    }

    fn supplied(&self) -> Option<u64> {
        Some(self.supplied)
    }

    fn set_poll_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn close(&mut self) {
        self.queue.close();
    }
}
