//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the SSE endpoint.
//! The relay itself (Manager, ConnectionRegistry, replay buffers, event types)
//! lives in the `sse` crate.

pub mod handler;
