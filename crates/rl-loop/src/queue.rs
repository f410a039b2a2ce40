//! Record Queue — unbounded FIFO between one producer and the loop
//!
//! The producer side never blocks. The consumer waits at most the given
//! timeout. Closing drops the channel sender, which wakes a blocked consumer;
//! records enqueued before the close are still delivered, after which every
//! dequeue reports `Closed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use rl_record::RawRecord;

use crate::error::QueueError;

/// A queued raw record with its enqueue time
#[derive(Debug)]
pub struct QueueEntry {
    pub record: RawRecord,
    pub enqueued_at: DateTime<Utc>,
    enqueued: Instant,
}

impl QueueEntry {
    fn new(record: RawRecord) -> Self {
        Self {
            record,
            enqueued_at: Utc::now(),
            enqueued: Instant::now(),
        }
    }

    /// Time spent in the queue so far
    pub fn waited(&self) -> Duration {
        self.enqueued.elapsed()
    }
}

/// Result of a dequeue attempt
#[derive(Debug)]
pub enum Dequeue {
    Record(QueueEntry),
    /// Nothing arrived within the timeout; nothing was consumed
    TimedOut,
    /// The queue is closed and drained
    Closed,
}

/// Thread-safe record FIFO, shared through an `Arc`
pub struct RecordQueue {
    sender: RwLock<Option<Sender<QueueEntry>>>,
    receiver: Receiver<QueueEntry>,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

impl RecordQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        }
    }

    /// Append a record; fails only after `close()`
    pub fn enqueue(&self, record: RawRecord) -> Result<(), QueueError> {
        let sender = self.sender.read();
        let sender = sender.as_ref().ok_or(QueueError::Closed)?;
        sender
            .send(QueueEntry::new(record))
            .map_err(|_| QueueError::Closed)?;
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Take the oldest record, waiting up to `timeout`
    pub fn dequeue(&self, timeout: Duration) -> Dequeue {
        match self.receiver.recv_timeout(timeout) {
            Ok(entry) => {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                Dequeue::Record(entry)
            }
            Err(RecvTimeoutError::Timeout) => Dequeue::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Dequeue::Closed,
        }
    }

    /// Refuse further records and wake a waiting consumer
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            log::debug!("[Queue] Closed after {} records", self.enqueued_count());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Records waiting to be dequeued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued_count(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

impl Default for RecordQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("enqueued", &self.enqueued_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn raw(tag: u16) -> RawRecord {
        RawRecord::new(tag, Vec::new())
    }

    fn tag_of(result: Dequeue) -> Option<u16> {
        match result {
            Dequeue::Record(entry) => Some(entry.record.tag),
            _ => None,
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = RecordQueue::new();
        for tag in 1..=5 {
            queue.enqueue(raw(tag)).unwrap();
        }
        assert_eq!(queue.len(), 5);
        let timeout = Duration::from_millis(10);
        assert_eq!(tag_of(queue.dequeue(timeout)), Some(1));
        queue.enqueue(raw(6)).unwrap();
        let rest: Vec<_> = (0..5).filter_map(|_| tag_of(queue.dequeue(timeout))).collect();
        assert_eq!(rest, vec![2, 3, 4, 5, 6]);
        assert_eq!(queue.dequeued_count(), 6);
    }

    #[test]
    fn test_timeout_waits_and_consumes_nothing() {
        let queue = RecordQueue::new();
        let timeout = Duration::from_millis(30);
        let start = Instant::now();
        assert!(matches!(queue.dequeue(timeout), Dequeue::TimedOut));
        assert!(start.elapsed() >= timeout);
        assert_eq!(queue.dequeued_count(), 0);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let queue = RecordQueue::new();
        queue.enqueue(raw(1)).unwrap();
        queue.enqueue(raw(2)).unwrap();
        queue.close();
        queue.close();

        assert_eq!(queue.enqueue(raw(3)), Err(QueueError::Closed));
        let timeout = Duration::from_millis(10);
        assert_eq!(tag_of(queue.dequeue(timeout)), Some(1));
        assert_eq!(tag_of(queue.dequeue(timeout)), Some(2));
        assert!(matches!(queue.dequeue(timeout), Dequeue::Closed));
        assert!(matches!(queue.dequeue(timeout), Dequeue::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = Arc::new(RecordQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                let result = queue.dequeue(Duration::from_secs(10));
                (matches!(result, Dequeue::Closed), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        let (closed, waited) = consumer.join().unwrap();
        assert!(closed);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_concurrent_producer_loses_nothing() {
        let queue = Arc::new(RecordQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for tag in 0..1000u16 {
                    queue.enqueue(raw(tag)).unwrap();
                }
                queue.close();
            })
        };

        let mut seen = Vec::new();
        loop {
            match queue.dequeue(Duration::from_millis(50)) {
                Dequeue::Record(entry) => seen.push(entry.record.tag),
                Dequeue::TimedOut => continue,
                Dequeue::Closed => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..1000u16).collect::<Vec<_>>());
    }
}
