use axum::extract::{Path, Query, State};
use axum::Json;
use playbook_core::types::RunStatus;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct TransitionParams {
    pub from: String,
    pub to: String,
}

/// GET /api/runs/transition?from=<status>&to=<status>
///
/// Checks a transition the run-control layer wants to make. Invalid ones
/// answer 422.
pub async fn check_transition(
    Query(params): Query<TransitionParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let from: RunStatus = params.from.parse()?;
    let to: RunStatus = params.to.parse()?;
    from.transition(to)?;
    Ok(Json(serde_json::json!({
        "from": from,
        "to": to,
        "valid": true,
        "terminal": to.is_terminal(),
    })))
}

/// GET /api/runs/{id}
pub async fn get_run(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cached = app.refresher.snapshot().await?;
    let repo = &cached.repository;
    let run = repo.run(&id)?;
    let playbook = repo.owner(run);
    Ok(Json(serde_json::json!({
        "run": run,
        "playbook": playbook.map(|p| serde_json::json!({
            "id": p.id,
            "name": p.name,
            "segment": p.segment,
        })),
        "response_rate": run.response_rate(),
        "meeting_rate": run.meeting_rate(),
        "performance_score": run
            .is_completed()
            .then(|| app.config().run_score.score(run)),
        "quality": repo.quality_report().for_record(&id),
    })))
}
