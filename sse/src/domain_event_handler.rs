use crate::message::Event as SseEvent;
use crate::{Manager, PublishOutcome};
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by converting them to SSE events and publishing them
/// to every open stream.
///
/// Publishing is best-effort: the outcome is only logged, since the webhook
/// that raised the event has already persisted the message.
pub struct SseDomainEventHandler {
    sse_manager: Arc<Manager>,
}

impl SseDomainEventHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }
}

#[async_trait]
impl EventHandler for SseDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let sse_event = match event {
            DomainEvent::MessageAdded(message) => {
                debug!(
                    "Handling MessageAdded event for conversation {}",
                    message.conversation_sid
                );
                SseEvent::NewMessage(message.clone())
            }

            DomainEvent::DeliveryStatusChanged(receipt) => {
                debug!(
                    "Handling DeliveryStatusChanged event for message {} ({})",
                    receipt.message_sid, receipt.status
                );
                if receipt.status.is_failure() {
                    warn!(
                        "Message {} was not delivered: {} {}",
                        receipt.message_sid,
                        receipt.error_code.as_deref().unwrap_or("-"),
                        receipt.error_message.as_deref().unwrap_or("")
                    );
                }
                SseEvent::DeliveryStatusUpdate(receipt.clone())
            }
        };

        match self.sse_manager.publish(sse_event) {
            PublishOutcome::Delivered(count) => {
                debug!(
                    "Relayed event for message {} to {} connection(s)",
                    event.message_sid(),
                    count
                )
            }
            PublishOutcome::Recovered => {
                debug!("Queued message {} for recovery", event.message_sid())
            }
            PublishOutcome::Dropped => {
                debug!(
                    "No listeners for message {}, event dropped",
                    event.message_sid()
                )
            }
        }
    }
}
