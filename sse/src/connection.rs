use crate::error::{Error, Result};
use crate::message::Frame;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::*;
use std::fmt;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedSender;

/// Write half of a connection's stream. The read half is owned by the HTTP
/// response body; once it is dropped every send fails.
pub type FrameSender = UnboundedSender<Frame>;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub sender: FrameSender,
    pub connected_at: DateTime<Utc>,
    /// Refreshed by successful heartbeats; staleness is measured from here.
    pub last_seen: DateTime<Utc>,
}

/// Registry of live push streams keyed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection - O(1)
    pub fn register(&self, sender: FrameSender, now: DateTime<Utc>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.insert(connection_id.clone(), sender, now);
        connection_id
    }

    /// Register a connection under an id the caller already handed out.
    pub fn insert(&self, connection_id: ConnectionId, sender: FrameSender, now: DateTime<Utc>) {
        self.connections.insert(
            connection_id,
            ConnectionInfo {
                sender,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    /// Unregister a connection - O(1). Returns whether it was still registered;
    /// teardown and write-failure paths may race, so absence is not an error.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Mark a connection as alive at `now`.
    pub fn touch(&self, connection_id: &ConnectionId, now: DateTime<Utc>) {
        if let Some(mut info) = self.connections.get_mut(connection_id) {
            info.last_seen = now;
        }
    }

    /// Remove every connection not seen for longer than `threshold`.
    /// Removed streams are not written to; dropping their sender ends them.
    pub fn prune_stale(&self, now: DateTime<Utc>, threshold: Duration) -> usize {
        let mut pruned = 0;
        self.connections.retain(|connection_id, info| {
            let alive = now - info.last_seen <= threshold;
            if !alive {
                debug!(
                    "Pruning stale SSE connection {} (connected at {}, last seen {})",
                    connection_id, info.connected_at, info.last_seen
                );
                pruned += 1;
            }
            alive
        });
        pruned
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Drop every connection, ending their streams. Returns how many were open.
    pub fn clear(&self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        count
    }

    /// Invoke `f` for every live connection. A connection whose write fails is
    /// unregistered once iteration finishes; the remaining connections are
    /// still visited. Returns the number of successful calls.
    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&ConnectionId, &FrameSender) -> core::result::Result<(), SendError<Frame>>,
    {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.connections.iter() {
            match f(entry.key(), &entry.value().sender) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to write to SSE connection {}: {}. Connection will be cleaned up.",
                        entry.key(),
                        e
                    );
                    dead.push(entry.key().clone());
                }
            }
        }

        // Shard locks from the iterator must be released before removal.
        for connection_id in dead {
            self.unregister(&connection_id);
        }

        delivered
    }

    /// Write a frame to every live connection.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        self.for_each(|_, sender| sender.send(frame.clone()))
    }

    /// Write a frame to a single connection, unregistering it if the write fails.
    pub fn send_to(&self, connection_id: &ConnectionId, frame: Frame) -> Result<()> {
        let sender = match self.connections.get(connection_id) {
            Some(info) => info.sender.clone(),
            None => return Err(Error::DeadConnection(connection_id.clone())),
        };

        if sender.send(frame).is_err() {
            warn!(
                "Failed to write to SSE connection {}. Connection will be cleaned up.",
                connection_id
            );
            self.unregister(connection_id);
            return Err(Error::DeadConnection(connection_id.clone()));
        }

        Ok(())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Event;
    use tokio::sync::mpsc;

    fn frame() -> Frame {
        Frame::encode(&Event::heartbeat(Utc::now()))
    }

    #[test]
    fn register_and_unregister_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = registry.register(tx, Utc::now());
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&id));

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn clear_ends_every_stream() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(tx, Utc::now());

        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn connection_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = registry.register(tx.clone(), Utc::now());
        let second = registry.register(tx, Utc::now());

        assert_ne!(first, second);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn prune_stale_removes_connections_past_threshold() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let t0 = Utc::now();

        let old = registry.register(tx.clone(), t0);
        let fresh = registry.register(tx, t0 + Duration::minutes(4));

        let pruned = registry.prune_stale(
            t0 + Duration::minutes(5) + Duration::seconds(1),
            Duration::minutes(5),
        );

        assert_eq!(pruned, 1);
        assert!(!registry.contains(&old));
        assert!(registry.contains(&fresh));
    }

    #[test]
    fn prune_stale_keeps_connection_exactly_at_threshold() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let t0 = Utc::now();

        let id = registry.register(tx, t0);

        assert_eq!(
            registry.prune_stale(t0 + Duration::minutes(5), Duration::minutes(5)),
            0
        );
        assert!(registry.contains(&id));
    }

    #[test]
    fn touch_refreshes_staleness() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let t0 = Utc::now();

        let id = registry.register(tx, t0);
        registry.touch(&id, t0 + Duration::minutes(4));

        registry.prune_stale(t0 + Duration::minutes(6), Duration::minutes(5));
        assert!(registry.contains(&id));
    }

    #[test]
    fn broadcast_isolates_dead_connections() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let a = registry.register(tx_a, Utc::now());
        let dead = registry.register(tx_dead, Utc::now());
        let b = registry.register(tx_b, Utc::now());
        drop(rx_dead);

        let delivered = registry.broadcast(&frame());

        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(registry.contains(&a));
        assert!(registry.contains(&b));
        assert!(!registry.contains(&dead));
    }

    #[test]
    fn send_to_dead_connection_unregisters_it() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(tx, Utc::now());
        drop(rx);

        let result = registry.send_to(&id, frame());

        assert_eq!(result, Err(Error::DeadConnection(id.clone())));
        assert!(!registry.contains(&id));
    }
}
