use crate::connection::ConnectionRegistry;
use crate::message::{Event, EventType, Frame};
use crate::recovery::{InMemoryRecoveryQueue, RecoveryStore};
use crate::ring_buffer::{BufferedEvent, RingBuffer};
use crate::settings::RelaySettings;
use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use std::sync::Arc;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Written to this many live connections.
    Delivered(usize),
    /// Nobody was listening; held in the recovery queue for the next stream.
    Recovered,
    /// Nobody was listening and the event is not recoverable.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub connections: usize,
    pub buffered_events: usize,
    pub queued_recoveries: usize,
}

/// Broadcast dispatcher and owner of the relay's shared state.
///
/// One instance lives for the whole process and is shared through `AppState`;
/// creating one per request would silently break replay and recovery.
pub struct Manager {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) ring_buffer: RingBuffer,
    pub(crate) recovery: Option<Arc<dyn RecoveryStore>>,
    pub(crate) settings: RelaySettings,
}

impl Manager {
    pub fn new(settings: RelaySettings) -> Self {
        let recovery = InMemoryRecoveryQueue::new(
            settings.recovery_queue_capacity,
            settings.recovery_queue_max_age,
        );
        Self::with_recovery_store(settings, Some(Arc::new(recovery)))
    }

    /// Build a manager around a caller-supplied recovery store. `None` runs the
    /// relay without recovery; live delivery is unaffected.
    pub fn with_recovery_store(
        settings: RelaySettings,
        recovery: Option<Arc<dyn RecoveryStore>>,
    ) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            ring_buffer: RingBuffer::new(settings.ring_buffer_capacity),
            recovery,
            settings,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Publish an event to every open stream.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        self.publish_at(event, Utc::now())
    }

    /// Publish as of `now`: buffer, prune stale connections, then fan out or
    /// hand the event to the recovery queue. Never fails.
    pub fn publish_at(&self, event: Event, now: DateTime<Utc>) -> PublishOutcome {
        let frame = Frame::encode(&event);

        self.ring_buffer.push(BufferedEvent {
            event: event.clone(),
            frame: frame.clone(),
            published_at: now,
        });

        let pruned = self
            .registry
            .prune_stale(now, self.settings.stale_threshold);
        if pruned > 0 {
            info!("Pruned {pruned} stale SSE connection(s)");
        }

        if self.registry.count() == 0 {
            return self.recover(event, now);
        }

        let delivered = self.registry.broadcast(&frame);
        if delivered == 0 {
            // Every remaining connection turned out to be dead.
            return self.recover(event, now);
        }

        debug!(
            "Sent {} event to {} SSE connection(s)",
            event.event_type(),
            delivered
        );
        PublishOutcome::Delivered(delivered)
    }

    fn recover(&self, event: Event, now: DateTime<Utc>) -> PublishOutcome {
        let message = match event {
            Event::NewMessage(message) => message,
            other => {
                debug!(
                    "No SSE connections, dropping {} event",
                    other.event_type()
                );
                return PublishOutcome::Dropped;
            }
        };

        let Some(store) = &self.recovery else {
            warn!(
                "No SSE connections and no recovery queue, message {} will only appear on reload",
                message.message_sid
            );
            return PublishOutcome::Dropped;
        };

        let message_sid = message.message_sid.clone();
        match store.enqueue(message, now) {
            Ok(()) => {
                info!("No SSE connections, queued message {message_sid} for recovery");
                PublishOutcome::Recovered
            }
            Err(e) => {
                warn!("Failed to queue message {message_sid} for recovery: {e}");
                PublishOutcome::Dropped
            }
        }
    }

    /// Close every open stream, e.g. on process shutdown.
    pub fn close_all(&self) -> usize {
        self.registry.clear()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.count(),
            buffered_events: self.ring_buffer.len(),
            queued_recoveries: self.recovery.as_ref().map_or(0, |store| store.len()),
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(RelaySettings::default())
    }
}
