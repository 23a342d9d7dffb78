use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use playbook_core::config::AnalyticsConfig;
use playbook_core::error::AnalyticsError;
use playbook_core::funnel::FunnelSnapshot;
use playbook_core::matrix::MatrixMetric;
use playbook_core::report::{build_report, AnalyticsSummary, ReportRequest};
use playbook_core::repository::RunRepository;
use playbook_core::timeline::TimelineFilter;
use playbook_core::types::RunStatus;
use playbook_core::window::TimeRange;
use playbook_core::{health, matrix, timeline};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_VIEW: &str = "default";

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
pub struct ViewParams {
    pub view: Option<String>,
    pub metric: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub playbook_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::bad_request(format!("invalid {name} '{value}': {e}")))
}

impl ViewParams {
    pub fn to_request(
        &self,
        config: &AnalyticsConfig,
        now: DateTime<Utc>,
    ) -> Result<ReportRequest, AppError> {
        let mut request = ReportRequest::new(now);

        if let Some(m) = &self.metric {
            request = request.with_metric(m.parse::<MatrixMetric>()?);
        }

        let start = self.start.as_deref().map(|s| parse_time("start", s)).transpose()?;
        let end = self.end.as_deref().map(|s| parse_time("end", s)).transpose()?;
        let range = match (start, end) {
            (Some(s), Some(e)) => Some(TimeRange::new(s, e)?),
            (Some(s), None) => Some(TimeRange::new(s, now)?),
            (None, Some(e)) => Some(TimeRange::last_days(e, config.timeline.default_range_days)),
            (None, None) => None,
        };
        if let Some(range) = range {
            request = request.with_range(range);
        }

        let status = self
            .status
            .as_deref()
            .map(str::parse::<RunStatus>)
            .transpose()?;
        request = request.with_filter(TimelineFilter {
            playbook_id: self.playbook_id.clone(),
            status,
        });

        if let Some(limit) = self.limit {
            request = request.with_insight_limit(limit);
        }
        Ok(request)
    }

    fn view_key(&self) -> &str {
        self.view.as_deref().unwrap_or(DEFAULT_VIEW)
    }
}

/// Run `f` on the blocking pool against the current snapshot.
async fn compute<T, F>(app: &AppState, params: &ViewParams, f: F) -> Result<Json<serde_json::Value>, AppError>
where
    T: Serialize,
    F: FnOnce(&RunRepository, &ReportRequest, &AnalyticsConfig) -> Result<T, AnalyticsError>
        + Send
        + 'static,
{
    let request = params.to_request(app.config(), Utc::now())?;
    let cached = app.refresher.snapshot().await?;
    let refresher = app.refresher.clone();
    let value = tokio::task::spawn_blocking(move || -> Result<serde_json::Value, AppError> {
        let out = f(&cached.repository, &request, refresher.config())?;
        Ok(serde_json::to_value(out)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(value))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/analytics/report?view=&metric=&start=&end=&playbook_id=&status=
///
/// Returns the stored result when `view` names a refreshed view, otherwise
/// computes a report on demand.
pub async fn get_report(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(view) = &params.view {
        if let Some(stored) = app.refresher.view(view).await {
            return Ok(Json(serde_json::to_value(&*stored)?));
        }
    }
    compute(&app, &params, |repo, req, cfg| Ok(build_report(repo, req, cfg))).await
}

/// GET /api/analytics/funnel
pub async fn get_funnel(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, req, cfg| {
        let range = req.window(cfg);
        Ok(FunnelSnapshot::from_runs(repo.runs_in(Some(&range))).aggregate())
    })
    .await
}

/// GET /api/analytics/matrix?metric=
pub async fn get_matrix(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, req, cfg| {
        let range = req.window(cfg);
        let grid = repo.cells(Some(&range));
        let prior = repo.cells(Some(&range.prior()));
        Ok(matrix::compute(&grid, Some(&prior), req.metric, &cfg.matrix))
    })
    .await
}

/// GET /api/analytics/health
pub async fn get_health(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, req, cfg| {
        let range = req.window(cfg);
        let grid = repo.cells(Some(&range));
        let prior = repo.cells(Some(&range.prior()));
        Ok(health::score_grid(&grid, Some(&prior), &cfg.health))
    })
    .await
}

/// GET /api/analytics/timeline?start=&end=&playbook_id=&status=
pub async fn get_timeline(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, req, cfg| {
        if let Some(id) = &req.filter.playbook_id {
            // Orphan runs still count, so a playbook id only seen on runs is valid.
            if !repo.knows_playbook(id) {
                return Err(AnalyticsError::PlaybookNotFound(id.clone()));
            }
        }
        Ok(timeline::aggregate(
            repo.runs(),
            &req.window(cfg),
            &req.filter,
            &cfg.run_score,
            cfg.timeline.buckets,
        ))
    })
    .await
}

/// GET /api/analytics/insights?limit=
pub async fn get_insights(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, req, cfg| {
        Ok(build_report(repo, req, cfg).insights)
    })
    .await
}

/// GET /api/analytics/summary
pub async fn get_summary(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, _, _| {
        Ok(AnalyticsSummary::from_repository(repo))
    })
    .await
}

/// GET /api/analytics/quality
pub async fn get_quality(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    compute(&app, &params, |repo, _, _| {
        let report = repo.quality_report();
        Ok(serde_json::json!({
            "summary": report.summarize(),
            "clean": report.is_clean(),
            "entries": report.entries,
        }))
    })
    .await
}

/// POST /api/analytics/refresh?view=
///
/// Refetches telemetry and recomputes the view. A newer refresh of the same
/// view answers 409 to the one it superseded.
pub async fn refresh(
    State(app): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = params.to_request(app.config(), Utc::now())?;
    let view = params.view_key().to_string();
    let result = app.refresher.refresh(&view, request).await?;
    Ok(Json(serde_json::json!({
        "view": result.view,
        "generation": result.generation,
        "fallback": result.fallback,
        "fetched_at": result.fetched_at,
        "insights": result.report.insights.len(),
    })))
}
