//! Holding area for messages published while nobody was connected.
//!
//! The next stream to open drains the queue, so the first viewer after a
//! quiet period still gets nudged about what arrived. Delivery is attempted
//! at most once; the browser can always reload history from the database.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use events::InboundMessage;
use log::*;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryItem {
    pub message: InboundMessage,
    pub enqueued_at: DateTime<Utc>,
}

/// Storage for undelivered `newMessage` events.
///
/// `drain_all` must hand each item to exactly one caller, even when it races
/// with `enqueue`.
pub trait RecoveryStore: Send + Sync {
    fn enqueue(&self, message: InboundMessage, now: DateTime<Utc>) -> Result<()>;

    /// Take every queued item in enqueue order, leaving the store empty.
    fn drain_all(&self, now: DateTime<Utc>) -> Result<Vec<RecoveryItem>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local recovery queue, bounded in both size and age.
pub struct InMemoryRecoveryQueue {
    items: Mutex<VecDeque<RecoveryItem>>,
    capacity: usize,
    max_age: Duration,
}

impl InMemoryRecoveryQueue {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            max_age,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RecoveryItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecoveryStore for InMemoryRecoveryQueue {
    fn enqueue(&self, message: InboundMessage, now: DateTime<Utc>) -> Result<()> {
        let mut items = self.lock();
        items.push_back(RecoveryItem {
            message,
            enqueued_at: now,
        });

        while items.len() > self.capacity {
            if let Some(dropped) = items.pop_front() {
                warn!(
                    "Recovery queue full ({} items), dropping message {}",
                    self.capacity, dropped.message.message_sid
                );
            }
        }

        Ok(())
    }

    fn drain_all(&self, now: DateTime<Utc>) -> Result<Vec<RecoveryItem>> {
        let drained = std::mem::take(&mut *self.lock());

        let (fresh, expired): (Vec<_>, Vec<_>) = drained
            .into_iter()
            .partition(|item| now - item.enqueued_at <= self.max_age);

        if !expired.is_empty() {
            debug!("Discarded {} expired recovery item(s)", expired.len());
        }

        Ok(fresh)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn message(sid: &str) -> InboundMessage {
        InboundMessage {
            conversation_sid: "CH1".to_string(),
            message_sid: sid.to_string(),
            body: Some("hello".to_string()),
            author: None,
            date_created: None,
            index: None,
        }
    }

    fn queue() -> InMemoryRecoveryQueue {
        InMemoryRecoveryQueue::new(100, Duration::minutes(10))
    }

    #[test]
    fn drain_returns_items_in_order_then_empty() {
        let queue = queue();
        let now = Utc::now();

        for sid in ["IM1", "IM2", "IM3"] {
            queue.enqueue(message(sid), now).unwrap();
        }

        let drained: Vec<String> = queue
            .drain_all(now)
            .unwrap()
            .into_iter()
            .map(|item| item.message.message_sid)
            .collect();

        assert_eq!(drained, vec!["IM1", "IM2", "IM3"]);
        assert!(queue.drain_all(now).unwrap().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_drops_oldest() {
        let queue = InMemoryRecoveryQueue::new(2, Duration::minutes(10));
        let now = Utc::now();

        for sid in ["IM1", "IM2", "IM3"] {
            queue.enqueue(message(sid), now).unwrap();
        }

        let drained: Vec<String> = queue
            .drain_all(now)
            .unwrap()
            .into_iter()
            .map(|item| item.message.message_sid)
            .collect();
        assert_eq!(drained, vec!["IM2", "IM3"]);
    }

    #[test]
    fn expired_items_are_discarded_on_drain() {
        let queue = queue();
        let now = Utc::now();

        queue
            .enqueue(message("old"), now - Duration::minutes(11))
            .unwrap();
        queue
            .enqueue(message("new"), now - Duration::minutes(1))
            .unwrap();

        let drained = queue.drain_all(now).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message.message_sid, "new");
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_enqueue_and_drain_deliver_each_item_once() {
        let queue = Arc::new(InMemoryRecoveryQueue::new(10_000, Duration::minutes(10)));
        let now = Utc::now();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.enqueue(message(&format!("IM{p}-{i}")), now).unwrap();
                    }
                })
            })
            .collect();

        let drainer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(queue.drain_all(now).unwrap());
                    thread::yield_now();
                }
                seen
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let mut delivered = drainer.join().unwrap();
        delivered.extend(queue.drain_all(now).unwrap());

        let unique: HashSet<String> = delivered
            .iter()
            .map(|item| item.message.message_sid.clone())
            .collect();
        assert_eq!(delivered.len(), 1000);
        assert_eq!(unique.len(), 1000);
    }
}
