//! Error types for the live-update relay.

use crate::connection::ConnectionId;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Failures that can occur inside the relay.
///
/// None of these ever cross the publish boundary: the dispatcher logs them and
/// carries on, because the webhook that triggered the publish has already
/// stored the authoritative message.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A write to a connection's stream failed; the peer has gone away.
    /// The connection is unregistered and never retried.
    DeadConnection(ConnectionId),

    /// The recovery queue could not accept or hand out items.
    RecoveryUnavailable(String),

    /// An event could not be encoded as JSON.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeadConnection(id) => write!(f, "Connection {} is no longer writable", id),
            Error::RecoveryUnavailable(msg) => write!(f, "Recovery queue unavailable: {}", msg),
            Error::Serialization(msg) => write!(f, "Failed to serialize event: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
