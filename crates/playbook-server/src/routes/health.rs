use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let current = app.refresher.current().await;
    Json(serde_json::json!({
        "status": "ok",
        "source": app.refresher.source().describe(),
        "snapshot_loaded": current.is_some(),
        "fetched_at": current.and_then(|c| c.snapshot.fetched_at),
    }))
}
