use crate::AppState;
use axum::extract::State;
use axum::Json;
use sse::RelayStats;

/// GET live connection and buffer counts for diagnostics
#[utoipa::path(
    get,
    path = "/sse/status",
    responses(
        (status = 200, description = "Connection, ring buffer and recovery queue counts")
    )
)]
pub async fn status(State(app_state): State<AppState>) -> Json<RelayStats> {
    Json(app_state.sse_manager.stats())
}
