use chrono::Duration;

/// Tunables for the relay. Defaults match the inbox's production behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Maximum number of recent events kept for replay.
    pub ring_buffer_capacity: usize,
    /// Only recent events younger than this are replayed to a new stream.
    pub ring_buffer_max_age: Duration,
    /// Connections not seen for longer than this are pruned on publish.
    pub stale_threshold: Duration,
    /// `None` disables heartbeats.
    pub heartbeat_interval: Option<std::time::Duration>,
    pub recovery_queue_capacity: usize,
    pub recovery_queue_max_age: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: 10,
            ring_buffer_max_age: Duration::seconds(60),
            stale_threshold: Duration::minutes(5),
            heartbeat_interval: Some(std::time::Duration::from_secs(30)),
            recovery_queue_capacity: 100,
            recovery_queue_max_age: Duration::minutes(10),
        }
    }
}
