pub mod client;
pub mod error;
pub mod refresher;
pub mod routes;
pub mod source;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use playbook_core::config::AnalyticsConfig;
use playbook_core::report::ReportRequest;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::refresher::Refresher;
use crate::source::SnapshotSource;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        .route("/api/health", get(routes::health::health))
        // Analytics views
        .route("/api/analytics/report", get(routes::analytics::get_report))
        .route("/api/analytics/funnel", get(routes::analytics::get_funnel))
        .route("/api/analytics/matrix", get(routes::analytics::get_matrix))
        .route("/api/analytics/health", get(routes::analytics::get_health))
        .route(
            "/api/analytics/timeline",
            get(routes::analytics::get_timeline),
        )
        .route(
            "/api/analytics/insights",
            get(routes::analytics::get_insights),
        )
        .route("/api/analytics/summary", get(routes::analytics::get_summary))
        .route("/api/analytics/quality", get(routes::analytics::get_quality))
        .route("/api/analytics/refresh", post(routes::analytics::refresh))
        // Runs
        .route(
            "/api/runs/transition",
            get(routes::runs::check_transition),
        )
        .route("/api/runs/{id}", get(routes::runs::get_run))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Build the shared state for `root`, reading from the live API or, when
/// `offline`, from the workspace snapshot file.
pub fn app_state(
    root: PathBuf,
    config: AnalyticsConfig,
    offline: bool,
) -> anyhow::Result<state::AppState> {
    let source = SnapshotSource::from_config(&root, &config, offline)?;
    let refresher = Arc::new(Refresher::new(source, Arc::new(config)));
    Ok(state::AppState::new(root, refresher))
}

/// Start the analytics server.
///
/// The default view is refreshed in the background so the first request
/// usually finds a snapshot already loaded.
pub async fn serve(
    root: PathBuf,
    config: AnalyticsConfig,
    offline: bool,
    port: u16,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, config, offline, listener).await
}

/// Start the analytics server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    root: PathBuf,
    config: AnalyticsConfig,
    offline: bool,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let state = app_state(root, config, offline)?;

    let refresher = Arc::clone(&state.refresher);
    tracing::info!(source = %refresher.source().describe(), "telemetry source");
    tokio::spawn(async move {
        let request = ReportRequest::new(Utc::now());
        if let Err(e) = refresher
            .refresh(routes::analytics::DEFAULT_VIEW, request)
            .await
        {
            tracing::warn!(error = %e, "initial refresh failed");
        }
    });

    tracing::info!("playbook analytics listening on http://localhost:{actual_port}");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
