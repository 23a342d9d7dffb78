use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;
use crate::funnel::{self, FunnelResult, FunnelSnapshot};
use crate::health::{self, HealthGrid};
use crate::insight::{self, Insight, InsightInputs, TrendHistory};
use crate::matrix::{self, BenchmarkMatrix, MatrixMetric};
use crate::metrics::percentage;
use crate::quality::QualityReport;
use crate::repository::RunRepository;
use crate::timeline::{self, Timeline, TimelineFilter};
use crate::window::TimeRange;

// ---------------------------------------------------------------------------
// AnalyticsSummary
// ---------------------------------------------------------------------------

/// Workspace-wide headline numbers, same shape as the collaborator's
/// `/playbooks/analytics/summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub active_playbooks: usize,
    pub total_playbooks: usize,
    pub total_leads_targeted: u64,
    pub response_rate: f64,
    pub total_meetings: u64,
}

impl AnalyticsSummary {
    pub fn from_repository(repo: &RunRepository) -> Self {
        let (mut leads, mut sent, mut responses, mut meetings) = (0u64, 0u64, 0u64, 0u64);
        for run in repo.runs() {
            leads = leads.saturating_add(run.leads_targeted);
            sent = sent.saturating_add(run.emails_sent);
            responses = responses.saturating_add(run.responses);
            meetings = meetings.saturating_add(run.meetings_booked);
        }
        Self {
            active_playbooks: repo.playbooks().iter().filter(|p| p.is_active()).count(),
            total_playbooks: repo.playbooks().len(),
            total_leads_targeted: leads,
            response_rate: percentage(responses as f64, sent as f64),
            total_meetings: meetings,
        }
    }
}

// ---------------------------------------------------------------------------
// ReportRequest
// ---------------------------------------------------------------------------

/// Everything a view needs to compute a report. Passed explicitly; nothing
/// is read from ambient state except through `now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub metric: MatrixMetric,
    /// Explicit window; `None` means the configured default ending at `now`.
    #[serde(default)]
    pub range: Option<TimeRange>,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub filter: TimelineFilter,
    #[serde(default)]
    pub insight_limit: Option<usize>,
}

impl ReportRequest {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            metric: MatrixMetric::ResponseRate,
            range: None,
            now,
            filter: TimelineFilter::default(),
            insight_limit: None,
        }
    }

    pub fn with_metric(mut self, metric: MatrixMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_filter(mut self, filter: TimelineFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_insight_limit(mut self, limit: usize) -> Self {
        self.insight_limit = Some(limit);
        self
    }

    pub fn window(&self, config: &AnalyticsConfig) -> TimeRange {
        self.range
            .unwrap_or_else(|| TimeRange::last_days(self.now, config.timeline.default_range_days))
    }
}

// ---------------------------------------------------------------------------
// AnalyticsReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub range: TimeRange,
    pub prior_range: TimeRange,
    pub summary: AnalyticsSummary,
    pub funnel: FunnelResult,
    pub matrix: BenchmarkMatrix,
    pub health: HealthGrid,
    pub timeline: Timeline,
    pub insights: Vec<Insight>,
    pub quality: QualityReport,
}

/// Compute every view for one request over an immutable repository.
///
/// Funnel, matrix, health and timeline are independent and run in parallel;
/// insights are ranked from their results.
pub fn build_report(
    repo: &RunRepository,
    request: &ReportRequest,
    config: &AnalyticsConfig,
) -> AnalyticsReport {
    let range = request.window(config);
    let prior_range = range.prior();
    let grid = repo.cells(Some(&range));
    let prior_grid = repo.cells(Some(&prior_range));

    let ((funnel, timeline), (matrix, health)) = rayon::join(
        || {
            rayon::join(
                || funnel::aggregate(&FunnelSnapshot::from_runs(repo.runs_in(Some(&range)))),
                || {
                    timeline::aggregate(
                        repo.runs(),
                        &range,
                        &request.filter,
                        &config.run_score,
                        config.timeline.buckets,
                    )
                },
            )
        },
        || {
            rayon::join(
                || matrix::compute(&grid, Some(&prior_grid), request.metric, &config.matrix),
                || health::score_grid(&grid, Some(&prior_grid), &config.health),
            )
        },
    );

    let response_matrix = if request.metric == MatrixMetric::ResponseRate {
        matrix.clone()
    } else {
        matrix::compute(&grid, Some(&prior_grid), MatrixMetric::ResponseRate, &config.matrix)
    };

    let history = trend_history(repo, &range, config.insights.history_windows);
    let insights = insight::rank(
        &InsightInputs {
            grid: &grid,
            funnel: &funnel,
            response_matrix: &response_matrix,
            health: &health,
            timeline: &timeline,
            history: &history,
        },
        &config.insights,
        request.insight_limit,
    );

    tracing::debug!(
        metric = %request.metric,
        runs = timeline.summary.total_runs,
        insights = insights.len(),
        "built analytics report"
    );

    AnalyticsReport {
        range,
        prior_range,
        summary: AnalyticsSummary::from_repository(repo),
        funnel,
        matrix,
        health,
        timeline,
        insights,
        quality: repo.quality_report().clone(),
    }
}

/// Series values for the `windows` equal-length windows before `range`,
/// oldest first. At most `MAX_HISTORY_WINDOWS` are used, and none reaching
/// past the earliest representable instant.
pub fn trend_history(repo: &RunRepository, range: &TimeRange, windows: u32) -> TrendHistory {
    let windows = windows.min(insight::MAX_HISTORY_WINDOWS);
    let mut prior = Vec::with_capacity(windows as usize);
    let mut w = *range;
    for _ in 0..windows {
        if w.start == DateTime::<Utc>::MIN_UTC {
            break;
        }
        w = w.prior();
        prior.push(w);
    }
    let mut history = TrendHistory::default();
    for w in prior.iter().rev() {
        history.record_window(&repo.cells(Some(w)));
    }
    history
}
