use crate::error::Result;
use chrono::{DateTime, Utc};
use events::{DeliveryReceipt, InboundMessage};
use log::*;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Marker placed in the payload of a frame whose event could not be encoded.
pub const SERIALIZATION_FAILED: &str = "serialization_failed";

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Every event the relay pushes to browsers.
///
/// Serialized adjacently tagged, so each frame reads
/// `{"type": "<event-type>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// First frame on every stream.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
        message: String,
    },

    /// Periodic keep-alive; a failed write surfaces a dead stream.
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: DateTime<Utc> },

    #[serde(rename = "newMessage")]
    NewMessage(InboundMessage),

    #[serde(rename = "deliveryStatusUpdate")]
    DeliveryStatusUpdate(DeliveryReceipt),
}

impl EventType for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::Heartbeat { .. } => "heartbeat",
            Event::NewMessage(_) => "newMessage",
            Event::DeliveryStatusUpdate(_) => "deliveryStatusUpdate",
        }
    }
}

impl Event {
    pub fn connected(connection_id: &str) -> Self {
        Event::Connected {
            connection_id: connection_id.to_string(),
            message: "SSE connection established".to_string(),
        }
    }

    pub fn heartbeat(timestamp: DateTime<Utc>) -> Self {
        Event::Heartbeat { timestamp }
    }

    pub fn conversation_sid(&self) -> Option<&str> {
        match self {
            Event::NewMessage(message) => Some(&message.conversation_sid),
            Event::DeliveryStatusUpdate(receipt) => receipt.conversation_sid.as_deref(),
            _ => None,
        }
    }

    pub fn message_sid(&self) -> Option<&str> {
        match self {
            Event::NewMessage(message) => Some(&message.message_sid),
            Event::DeliveryStatusUpdate(receipt) => Some(&receipt.message_sid),
            _ => None,
        }
    }
}

/// One encoded event, shared between every connection it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn try_encode(event: &Event) -> Result<Self> {
        Ok(Frame(serde_json::to_string(event)?.into()))
    }

    /// Encodes an event, substituting a minimal payload if encoding fails so
    /// a publish is never aborted by a bad event.
    pub fn encode(event: &Event) -> Self {
        Self::try_encode(event).unwrap_or_else(|e| {
            error!(
                "Failed to encode {} event, sending fallback payload: {e}",
                event.event_type()
            );
            Self::fallback(event, &e.to_string())
        })
    }

    /// Builds the payload sent in place of an event that could not be encoded:
    /// the conversation and message identifiers, when known, plus an error marker.
    pub fn fallback(event: &Event, detail: &str) -> Self {
        let mut data = Map::new();
        if let Some(conversation_sid) = event.conversation_sid() {
            data.insert("conversationSid".to_string(), conversation_sid.into());
        }
        if let Some(message_sid) = event.message_sid() {
            data.insert("messageSid".to_string(), message_sid.into());
        }
        data.insert("error".to_string(), SERIALIZATION_FAILED.into());
        data.insert("detail".to_string(), detail.into());

        let envelope = json!({ "type": event.event_type(), "data": Value::Object(data) });
        Frame(envelope.to_string().into())
    }

    /// The JSON text carried in the `data:` field of the SSE frame.
    pub fn as_json(&self) -> &str {
        &self.0
    }

    /// The frame exactly as written to a text/event-stream body.
    pub fn to_wire(&self) -> String {
        format!("data: {}\n\n", self.0)
    }
}
