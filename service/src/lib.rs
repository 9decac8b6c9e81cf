use config::Config;
use events::EventPublisher;
use log::info;
use sse::{Manager, SseDomainEventHandler};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Process-wide state: created once at startup and cloned into every request.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_manager: Arc<Manager>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Builds the relay and wires it to the event publisher so webhook-derived
    /// domain events reach every open stream.
    pub fn new(app_config: Config) -> Self {
        let settings = app_config.relay_settings();
        info!(
            "Relay config: ring_buffer={} ({}s), stale_after={}s, heartbeat={:?}, \
             recovery_queue={} ({}s)",
            settings.ring_buffer_capacity,
            settings.ring_buffer_max_age.num_seconds(),
            settings.stale_threshold.num_seconds(),
            settings.heartbeat_interval,
            settings.recovery_queue_capacity,
            settings.recovery_queue_max_age.num_seconds(),
        );

        let sse_manager = Arc::new(Manager::new(settings));
        Self::with_manager(app_config, sse_manager)
    }

    pub fn with_manager(app_config: Config, sse_manager: Arc<Manager>) -> Self {
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(SseDomainEventHandler::new(sse_manager.clone())));

        Self {
            config: app_config,
            sse_manager,
            event_publisher,
        }
    }
}
