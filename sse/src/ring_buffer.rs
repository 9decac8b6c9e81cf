//! Short history of recently published events.
//!
//! A stream that opens moments after an event was published would otherwise
//! miss it. This is not durable history; clients load that from the
//! conversation API.

use crate::message::{Event, Frame};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An event as it was published, with its encoded frame.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub event: Event,
    pub frame: Frame,
    pub published_at: DateTime<Utc>,
}

pub struct RingBuffer {
    entries: Mutex<VecDeque<BufferedEvent>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest ones beyond capacity.
    pub fn push(&self, event: BufferedEvent) {
        let mut entries = self.lock();
        entries.push_back(event);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Events no older than `max_age`, oldest first.
    pub fn snapshot(&self, max_age: Duration) -> Vec<BufferedEvent> {
        self.snapshot_at(Utc::now(), max_age)
    }

    /// Same as [`RingBuffer::snapshot`] evaluated at `now`. An event whose age
    /// equals `max_age` is included.
    pub fn snapshot_at(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<BufferedEvent> {
        self.lock()
            .iter()
            .filter(|entry| now - entry.published_at <= max_age)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Entries are plain values, so a panic mid-push cannot corrupt them.
    fn lock(&self) -> MutexGuard<'_, VecDeque<BufferedEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
