use crate::Error;
use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use log::*;
use service::AppState;
use std::convert::Infallible;
use tokio::sync::mpsc;

/// SSE handler that establishes a long-lived connection for live inbox updates.
///
/// The first event is `connected`, followed by any replayed history, then live
/// events and periodic heartbeats.
#[utoipa::path(
    get,
    path = "/sse",
    responses(
        (status = 200, description = "Stream of inbox events", body = String, content_type = "text/event-stream"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let guard = app_state.sse_manager.open_stream(tx)?;
    debug!("Establishing SSE connection {}", guard.connection_id());

    // The stream owns the guard: when the client goes away axum drops the
    // stream and the connection is unregistered. The channel closes when the
    // relay itself drops the connection (e.g. stale pruning).
    let stream = stream! {
        let guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(frame.as_json()));
        }

        debug!("SSE connection {} ended by the relay", guard.connection_id());
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
