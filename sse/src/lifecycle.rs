//! Per-stream setup and teardown.

use crate::connection::{ConnectionId, ConnectionRegistry, FrameSender};
use crate::error::{Error, Result};
use crate::message::{Event, Frame};
use crate::Manager;
use chrono::{DateTime, Utc};
use log::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Registered, catching up on recovered and recent events.
    Opening,
    Open,
    /// Terminal.
    Closed,
}

/// Keeps a stream registered for as long as it is held.
///
/// The HTTP response body owns the guard; when the client disconnects the body
/// is dropped and the stream closes.
pub struct StreamGuard {
    connection_id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    heartbeat: Option<JoinHandle<()>>,
    state: StreamState,
}

impl StreamGuard {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Unregister the stream and stop its heartbeat. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.registry.unregister(&self.connection_id);
        self.state = StreamState::Closed;

        debug!("SSE connection {} closed", self.connection_id);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.close();
    }
}

impl Manager {
    /// Register a new stream and bring it up to date.
    ///
    /// The stream receives a `connected` frame, then anything waiting in the
    /// recovery queue, then the fresh part of the ring buffer, oldest first.
    /// The first two are written before the stream joins the registry, so no
    /// live event can overtake them. Any failed write closes the stream and
    /// returns [`Error::DeadConnection`].
    pub fn open_stream(&self, sender: FrameSender) -> Result<StreamGuard> {
        let now = Utc::now();
        let connection_id = ConnectionId::new();

        if sender
            .send(Frame::encode(&Event::connected(connection_id.as_str())))
            .is_err()
        {
            debug!("SSE connection {connection_id} went away before it was registered");
            return Err(Error::DeadConnection(connection_id));
        }

        let recovered = self.replay_recovery(&sender, &connection_id, now)?;

        self.registry.insert(connection_id.clone(), sender, now);
        let mut guard = StreamGuard {
            connection_id: connection_id.clone(),
            registry: self.registry.clone(),
            heartbeat: None,
            state: StreamState::Opening,
        };

        info!(
            "Registered SSE connection {} ({} live)",
            connection_id,
            self.registry.count()
        );

        // Events published between the recovery drain and registration are
        // only reachable through the ring buffer.
        self.replay_recent(&connection_id, now, &recovered)?;

        guard.heartbeat = self.spawn_heartbeat(connection_id);
        guard.state = StreamState::Open;
        Ok(guard)
    }

    /// Returns the message ids written to the stream. Drained items are handed
    /// out at most once; if the stream dies part way they are lost.
    fn replay_recovery(
        &self,
        sender: &FrameSender,
        connection_id: &ConnectionId,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let mut replayed = HashSet::new();

        let Some(store) = &self.recovery else {
            return Ok(replayed);
        };

        let items = match store.drain_all(now) {
            Ok(items) => items,
            Err(e) => {
                warn!("Skipping recovery replay for {connection_id}: {e}");
                return Ok(replayed);
            }
        };

        if !items.is_empty() {
            info!(
                "Replaying {} recovered message(s) to SSE connection {}",
                items.len(),
                connection_id
            );
        }

        let total = items.len();
        for item in items {
            let message_sid = item.message.message_sid.clone();
            if sender
                .send(Frame::encode(&Event::NewMessage(item.message)))
                .is_err()
            {
                warn!(
                    "SSE connection {} went away during recovery replay, {} message(s) lost",
                    connection_id,
                    total - replayed.len()
                );
                return Err(Error::DeadConnection(connection_id.clone()));
            }
            replayed.insert(message_sid);
        }

        Ok(replayed)
    }

    fn replay_recent(
        &self,
        connection_id: &ConnectionId,
        now: DateTime<Utc>,
        already_replayed: &HashSet<String>,
    ) -> Result<()> {
        let recent = self
            .ring_buffer
            .snapshot_at(now, self.settings.ring_buffer_max_age);

        for entry in recent {
            if let Event::NewMessage(message) = &entry.event {
                if already_replayed.contains(&message.message_sid) {
                    continue;
                }
            }
            self.registry.send_to(connection_id, entry.frame)?;
        }

        Ok(())
    }

    fn spawn_heartbeat(&self, connection_id: ConnectionId) -> Option<JoinHandle<()>> {
        let period = self.settings.heartbeat_interval?;
        let registry = self.registry.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let now = Utc::now();
                if registry
                    .send_to(&connection_id, Frame::encode(&Event::heartbeat(now)))
                    .is_err()
                {
                    debug!("Heartbeat failed for SSE connection {connection_id}, stopping");
                    break;
                }
                registry.touch(&connection_id, now);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RelaySettings;
    use crate::PublishOutcome;
    use events::InboundMessage;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    fn quiet_manager() -> Manager {
        Manager::new(RelaySettings {
            heartbeat_interval: None,
            ..RelaySettings::default()
        })
    }

    fn message(sid: &str) -> InboundMessage {
        InboundMessage {
            conversation_sid: "CH1".to_string(),
            message_sid: sid.to_string(),
            body: Some("hi".to_string()),
            author: None,
            date_created: None,
            index: None,
        }
    }

    fn new_message(sid: &str) -> Event {
        Event::NewMessage(message(sid))
    }

    fn parse(frame: &Frame) -> Value {
        serde_json::from_str(frame.as_json()).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(parse(&frame));
        }
        frames
    }

    #[test]
    fn first_frame_is_connected() {
        let manager = quiet_manager();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let guard = manager.open_stream(tx).unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "connected");
        assert_eq!(frames[0]["data"]["connectionId"], guard.connection_id().as_str());
        assert_eq!(guard.state(), StreamState::Open);
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn recovered_messages_replay_once_before_live_events() {
        let manager = quiet_manager();
        assert_eq!(manager.publish(new_message("IM1")), PublishOutcome::Recovered);
        assert_eq!(manager.publish(new_message("IM2")), PublishOutcome::Recovered);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = manager.open_stream(tx).unwrap();
        manager.publish(new_message("IM3"));

        let sids: Vec<Value> = drain(&mut rx)
            .into_iter()
            .filter(|frame| frame["type"] == "newMessage")
            .map(|frame| frame["data"]["messageSid"].clone())
            .collect();
        assert_eq!(sids, vec!["IM1", "IM2", "IM3"]);

        // The queue was drained by the first stream only.
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let _second = manager.open_stream(tx2).unwrap();
        let replayed: Vec<Value> = drain(&mut rx2)
            .into_iter()
            .filter(|frame| frame["type"] == "newMessage")
            .map(|frame| frame["data"]["messageSid"].clone())
            .collect();
        // Ring buffer still offers recent history to later joiners.
        assert_eq!(replayed, vec!["IM1", "IM2", "IM3"]);
        assert_eq!(manager.stats().queued_recoveries, 0);
    }

    #[test]
    fn recent_events_replay_to_new_stream() {
        let manager = quiet_manager();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let _a = manager.open_stream(tx_a).unwrap();

        manager.publish(new_message("IM1"));
        manager.publish(Event::heartbeat(Utc::now()));

        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let _b = manager.open_stream(tx_b).unwrap();

        let types: Vec<Value> = drain(&mut rx_b)
            .into_iter()
            .map(|frame| frame["type"].clone())
            .collect();
        assert_eq!(types, vec!["connected", "newMessage", "heartbeat"]);
    }

    #[test]
    fn expired_ring_entries_are_not_replayed() {
        let manager = quiet_manager();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let _a = manager.open_stream(tx_a).unwrap();
        manager.publish_at(
            new_message("IM-old"),
            Utc::now() - chrono::Duration::seconds(90),
        );

        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let _b = manager.open_stream(tx_b).unwrap();

        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn dropping_guard_unregisters() {
        let manager = quiet_manager();
        let (tx, _rx) = mpsc::unbounded_channel();

        let guard = manager.open_stream(tx).unwrap();
        assert_eq!(manager.connection_count(), 1);

        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let manager = quiet_manager();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut guard = manager.open_stream(tx).unwrap();

        guard.close();
        guard.close();

        assert_eq!(guard.state(), StreamState::Closed);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn dead_stream_is_rejected_before_registering() {
        let manager = quiet_manager();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let result = manager.open_stream(tx);

        assert!(matches!(result, Err(Error::DeadConnection(_))));
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn dead_stream_does_not_consume_recovery_queue() {
        let manager = quiet_manager();
        manager.publish(new_message("IM1"));
        manager.publish(new_message("IM2"));

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(manager.open_stream(tx).is_err());
        assert_eq!(manager.stats().queued_recoveries, 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = manager.open_stream(tx).unwrap();
        let sids: Vec<Value> = drain(&mut rx)
            .into_iter()
            .filter(|frame| frame["type"] == "newMessage")
            .map(|frame| frame["data"]["messageSid"].clone())
            .collect();
        assert_eq!(sids, vec!["IM1", "IM2"]);
        assert_eq!(manager.stats().queued_recoveries, 0);
    }

    #[test]
    fn concurrent_publishes_never_overtake_connected_or_recovery() {
        let manager = quiet_manager();
        let (tx_keep, _rx_keep) = mpsc::unbounded_channel();
        let _keep = manager.open_stream(tx_keep).unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut n = 0;
                while !done.load(Ordering::Relaxed) {
                    manager.publish(new_message(&format!("IM-live-{n}")));
                    n += 1;
                }
            });

            for round in 0..200 {
                let recovered_sid = format!("IM-rec-{round}");
                manager
                    .recovery
                    .as_ref()
                    .unwrap()
                    .enqueue(message(&recovered_sid), Utc::now())
                    .unwrap();

                let (tx, mut rx) = mpsc::unbounded_channel();
                let guard = manager.open_stream(tx).unwrap();
                let frames = drain(&mut rx);

                assert_eq!(frames[0]["type"], "connected", "round {round}");
                assert_eq!(
                    frames[0]["data"]["connectionId"],
                    guard.connection_id().as_str()
                );
                let first_live = frames
                    .iter()
                    .position(|frame| {
                        frame["data"]["messageSid"]
                            .as_str()
                            .is_some_and(|sid| sid.starts_with("IM-live-"))
                    })
                    .unwrap_or(frames.len());
                let recovered_at = frames
                    .iter()
                    .position(|frame| frame["data"]["messageSid"] == recovered_sid.as_str())
                    .unwrap();
                assert!(recovered_at < first_live, "round {round}");
            }

            done.store(true, Ordering::Relaxed);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_are_sent_on_interval() {
        let manager = Manager::new(RelaySettings {
            heartbeat_interval: Some(StdDuration::from_secs(30)),
            ..RelaySettings::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = manager.open_stream(tx).unwrap();

        assert_eq!(parse(&rx.recv().await.unwrap())["type"], "connected");

        tokio::time::advance(StdDuration::from_secs(31)).await;
        let heartbeat = parse(&rx.recv().await.unwrap());
        assert_eq!(heartbeat["type"], "heartbeat");
        assert!(heartbeat["data"]["timestamp"].is_string());

        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_stops_when_client_disconnects() {
        let manager = Manager::new(RelaySettings {
            heartbeat_interval: Some(StdDuration::from_secs(30)),
            ..RelaySettings::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = manager.open_stream(tx).unwrap();
        drop(rx);

        tokio::time::sleep(StdDuration::from_secs(61)).await;

        assert!(!manager.registry.contains(guard.connection_id()));
    }
}
