use crate::{controller::health_check_controller, AppState};
use axum::{
    routing::{get, post},
    Router,
};

use crate::controller::{relay_status_controller, webhook_controller};
use crate::sse::handler as sse_handler;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Inbox Relay API"
        ),
        paths(
            health_check_controller::health_check,
            relay_status_controller::status,
            sse_handler::sse_handler,
            webhook_controller::receive_event,
        ),
        tags(
            (name = "inbox_relay", description = "Live updates for the WhatsApp support inbox")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(sse_routes(app_state.clone()))
        .merge(webhook_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse", get(sse_handler::sse_handler))
        .route("/sse/status", get(relay_status_controller::status))
        .with_state(app_state)
}

fn webhook_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/webhooks/events",
            post(webhook_controller::receive_event),
        )
        .with_state(app_state)
}
