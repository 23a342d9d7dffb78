use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events: SSE stream that emits `refresh` whenever a view is recomputed.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.refresher.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let event = msg.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<Event, Infallible>(
            Event::default().event("refresh").id(event.id).data(data),
        ))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
