//! Server-Sent Events (SSE) live-update relay for the inbox.
//!
//! Pushes messages and delivery receipts arriving through provider webhooks to
//! every open browser session in near-real-time.
//!
//! # Architecture
//!
//! - **Connection registry**: DashMap of live streams keyed by a server-generated
//!   `ConnectionId`, with a last-seen timestamp used for lazy staleness pruning.
//! - **Ring buffer**: the last few published events, replayed to streams that
//!   open shortly after an event was published.
//! - **Recovery queue**: `newMessage` events published while nobody was
//!   connected, drained by the next stream that opens.
//! - **Manager**: the single dispatcher every webhook-derived event goes through.
//! - **Stream lifecycle**: `Manager::open_stream` registers and replays;
//!   dropping the returned `StreamGuard` closes the stream.
//!
//! # Message Flow
//!
//! 1. A webhook stores the message, then publishes a `DomainEvent`
//! 2. `SseDomainEventHandler` converts it into an SSE `Event`
//! 3. `Manager::publish` buffers it, prunes stale connections, and either
//!    writes it to every live stream or queues it for recovery
//! 4. The browser de-duplicates by `messageSid` and updates the conversation
//!
//! Everything here is in memory. After a restart clients simply reload
//! conversation history from the database.
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry and type-safe ConnectionId
//! - `ring_buffer`: bounded, age-filtered history of recent events
//! - `recovery`: RecoveryStore trait and the in-memory queue
//! - `manager`: the broadcast dispatcher
//! - `lifecycle`: per-stream open, replay, heartbeat and close
//! - `message`: event types and wire frames

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod recovery;
pub mod ring_buffer;
pub mod settings;

pub use domain_event_handler::SseDomainEventHandler;
pub use error::Error;
pub use lifecycle::{StreamGuard, StreamState};
pub use manager::{Manager, PublishOutcome, RelayStats};
pub use settings::RelaySettings;
