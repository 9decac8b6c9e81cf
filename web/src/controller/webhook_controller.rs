//! Controller for inbound inbox events.
//!
//! The provider-specific receivers (Twilio Conversations, Bird) store each
//! message first and then forward a normalized event here, so the relay can
//! push it to open browser sessions.

use crate::{AppState, Error};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use events::DomainEvent;
use log::*;
use serde::Serialize;

pub(crate) const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Response for webhook acknowledgment
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
}

/// POST /webhooks/events
///
/// Accepts `{"type": "newMessage" | "deliveryStatusUpdate", "data": {...}}`.
/// Publishing is best-effort and never fails the request once the event is
/// accepted.
#[utoipa::path(
    post,
    path = "/webhooks/events",
    request_body(content = serde_json::Value, content_type = "application/json"),
    responses(
        (status = 202, description = "Event accepted for relay"),
        (status = 401, description = "Missing or invalid webhook secret"),
        (status = 422, description = "Body is not a recognized inbox event")
    )
)]
pub async fn receive_event(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<DomainEvent>,
) -> Result<impl IntoResponse, Error> {
    if let Some(expected_secret) = app_state.config.webhook_secret() {
        let provided_secret = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if provided_secret != expected_secret {
            warn!("Invalid webhook secret received");
            return Err(Error::Unauthorized);
        }
    }

    debug!("Received inbox webhook for message {}", event.message_sid());

    app_state.event_publisher.publish(event).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            status: "accepted".to_string(),
        }),
    ))
}
