use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use crate::funnel::FunnelResult;
use crate::grid::CellGrid;
use crate::health::{HealthGrid, HealthTier};
use crate::matrix::{BenchmarkMatrix, MatrixMetric};
use crate::metrics::{mean, pct_change};
use crate::timeline::Timeline;
use crate::types::{Channel, RunStatus, Segment};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Optimization,
    Warning,
    Opportunity,
    Trend,
    Prediction,
}

impl InsightType {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightType::Optimization => "optimization",
            InsightType::Warning => "warning",
            InsightType::Opportunity => "opportunity",
            InsightType::Trend => "trend",
            InsightType::Prediction => "prediction",
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order is ranking order: high sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested follow-ups. Never applied automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ViewDetails,
    AdjustChannelMix,
    RebalanceSegment,
    ReviewSequence,
    PausePlaybook,
    ScalePlaybook,
    ScheduleReview,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ViewDetails => "view_details",
            ActionKind::AdjustChannelMix => "adjust_channel_mix",
            ActionKind::RebalanceSegment => "rebalance_segment",
            ActionKind::ReviewSequence => "review_sequence",
            ActionKind::PausePlaybook => "pause_playbook",
            ActionKind::ScalePlaybook => "scale_playbook",
            ActionKind::ScheduleReview => "schedule_review",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightAction {
    pub label: String,
    pub kind: ActionKind,
}

impl InsightAction {
    fn new(label: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub impact: u32,
    pub effort: String,
    pub evidence: Vec<String>,
    pub actions: Vec<InsightAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
}

// ---------------------------------------------------------------------------
// InsightPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightPolicy {
    #[serde(default = "default_high_trend_pct")]
    pub high_trend_pct: f64,
    #[serde(default = "default_medium_trend_pct")]
    pub medium_trend_pct: f64,
    /// Cap on returned insights; 0 disables the cap.
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,
    /// Minimum response-rate gap, in points, between channels of a segment.
    #[serde(default = "default_channel_gap_pct")]
    pub channel_gap_pct: f64,
    /// Prior windows feeding each series baseline.
    #[serde(default = "default_history_windows")]
    pub history_windows: u32,
}

fn default_high_trend_pct() -> f64 {
    20.0
}

fn default_medium_trend_pct() -> f64 {
    5.0
}

fn default_max_insights() -> usize {
    10
}

fn default_channel_gap_pct() -> f64 {
    5.0
}

fn default_history_windows() -> u32 {
    3
}

/// Upper bound on `history_windows` honored when building trend history.
pub const MAX_HISTORY_WINDOWS: u32 = 52;

impl Default for InsightPolicy {
    fn default() -> Self {
        Self {
            high_trend_pct: default_high_trend_pct(),
            medium_trend_pct: default_medium_trend_pct(),
            max_insights: default_max_insights(),
            channel_gap_pct: default_channel_gap_pct(),
            history_windows: default_history_windows(),
        }
    }
}

impl InsightPolicy {
    pub fn priority(&self, trend_pct: Option<f64>, critical: bool) -> Priority {
        let Some(t) = trend_pct.map(f64::abs) else {
            return Priority::Low;
        };
        if t >= self.high_trend_pct {
            if critical {
                Priority::High
            } else {
                Priority::Medium
            }
        } else if t >= self.medium_trend_pct {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// `round(min(|trend|, 100) * 0.6 + share * 100 * 0.4)`, within 0–100.
pub fn impact(trend_pct: f64, segment_share: f64) -> u32 {
    let t = if trend_pct.is_finite() {
        trend_pct.abs().min(100.0)
    } else {
        100.0
    };
    let share = if segment_share.is_finite() {
        segment_share.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (t * 0.6 + share * 100.0 * 0.4).round().clamp(0.0, 100.0) as u32
}

// ---------------------------------------------------------------------------
// Series & TrendHistory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Series {
    ResponseRate,
    Meetings,
    MeetingRate,
    SegmentResponseRate(Segment),
    SegmentMeetings(Segment),
}

impl Series {
    pub fn key(self) -> String {
        match self {
            Series::ResponseRate => "response_rate".to_string(),
            Series::Meetings => "meetings".to_string(),
            Series::MeetingRate => "meeting_rate".to_string(),
            Series::SegmentResponseRate(s) => format!("{s}-response_rate"),
            Series::SegmentMeetings(s) => format!("{s}-meetings"),
        }
    }

    pub fn label(self) -> String {
        match self {
            Series::ResponseRate => "Response rate".to_string(),
            Series::Meetings => "Meetings booked".to_string(),
            Series::MeetingRate => "Meeting rate".to_string(),
            Series::SegmentResponseRate(s) => format!("{} response rate", s.label()),
            Series::SegmentMeetings(s) => format!("{} meetings", s.label()),
        }
    }

    /// Response rate and meeting volume drive pipeline directly.
    pub fn is_critical(self) -> bool {
        !matches!(self, Series::MeetingRate)
    }

    pub fn is_rate(self) -> bool {
        matches!(
            self,
            Series::ResponseRate | Series::MeetingRate | Series::SegmentResponseRate(_)
        )
    }

    pub fn segment(self) -> Option<Segment> {
        match self {
            Series::SegmentResponseRate(s) | Series::SegmentMeetings(s) => Some(s),
            _ => None,
        }
    }

    fn format(self, value: f64) -> String {
        if self.is_rate() {
            format!("{value:.1}%")
        } else {
            format!("{value:.0}")
        }
    }
}

/// Current value of every tracked series for a counter grid.
pub fn observe(grid: &CellGrid) -> Vec<(Series, f64)> {
    let total = grid.total();
    let mut values = vec![
        (Series::ResponseRate, total.response_rate()),
        (Series::Meetings, total.meetings),
        (Series::MeetingRate, total.meeting_rate()),
    ];
    for s in Segment::all() {
        let seg = grid.segment_total(*s);
        values.push((Series::SegmentResponseRate(*s), seg.response_rate()));
        values.push((Series::SegmentMeetings(*s), seg.meetings));
    }
    values
}

/// Prior values per series, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendHistory {
    series: BTreeMap<Series, Vec<f64>>,
}

impl TrendHistory {
    pub fn push(&mut self, series: Series, value: f64) {
        self.series.entry(series).or_default().push(value);
    }

    /// Record every series of one prior window's grid. Windows without any
    /// activity are skipped so they don't drag baselines to zero.
    pub fn record_window(&mut self, grid: &CellGrid) {
        if grid.is_empty() {
            return;
        }
        for (series, value) in observe(grid) {
            self.push(series, value);
        }
    }

    pub fn values(&self, series: Series) -> &[f64] {
        self.series.get(&series).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn baseline(&self, series: Series) -> Option<f64> {
        let values = self.values(series);
        (!values.is_empty()).then(|| mean(values))
    }

    /// `(current - baseline) / baseline * 100`; null without a usable baseline.
    pub fn trend(&self, series: Series, current: f64) -> Option<f64> {
        pct_change(current, self.baseline(series)?)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Current-window outputs the ranker draws from.
pub struct InsightInputs<'a> {
    pub grid: &'a CellGrid,
    pub funnel: &'a FunnelResult,
    /// Must be computed for `MatrixMetric::ResponseRate`.
    pub response_matrix: &'a BenchmarkMatrix,
    pub health: &'a HealthGrid,
    pub timeline: &'a Timeline,
    pub history: &'a TrendHistory,
}

/// Generate and rank insights. Stateless: identical inputs give identical
/// output, ids included.
pub fn rank(inputs: &InsightInputs<'_>, policy: &InsightPolicy, limit: Option<usize>) -> Vec<Insight> {
    let mut insights = Vec::new();
    insights.extend(trend_insights(inputs, policy));
    insights.extend(channel_gap_insights(inputs, policy));
    insights.extend(health_insights(inputs));
    insights.extend(funnel_insight(inputs.funnel, policy));
    insights.extend(prediction_insight(inputs.timeline));

    insights.sort_by(|a, b| {
        (a.priority, Reverse(a.impact), &a.id).cmp(&(b.priority, Reverse(b.impact), &b.id))
    });

    let cap = limit.unwrap_or(policy.max_insights);
    if cap > 0 {
        insights.truncate(cap);
    }
    tracing::debug!(count = insights.len(), "ranked insights");
    insights
}

fn segment_share(grid: &CellGrid, segment: Option<Segment>) -> f64 {
    let Some(segment) = segment else {
        return 1.0;
    };
    let total = grid.total().leads_targeted;
    if total > 0.0 {
        grid.segment_total(segment).leads_targeted / total
    } else {
        0.0
    }
}

fn trend_insights(inputs: &InsightInputs<'_>, policy: &InsightPolicy) -> Vec<Insight> {
    let mut out = Vec::new();
    for (series, current) in observe(inputs.grid) {
        let Some(baseline) = inputs.history.baseline(series) else {
            continue;
        };
        let Some(trend) = inputs.history.trend(series, current) else {
            continue;
        };
        if trend.abs() < policy.medium_trend_pct {
            continue;
        }

        let falling = trend < 0.0;
        let critical = series.is_critical();
        let insight_type = if critical && falling {
            InsightType::Warning
        } else {
            InsightType::Trend
        };
        let direction = if falling { "down" } else { "up" };
        let share = segment_share(inputs.grid, series.segment());
        let windows = inputs.history.values(series).len();

        let actions = match (insight_type, falling) {
            (InsightType::Warning, _) => vec![
                InsightAction::new("Review outreach sequence", ActionKind::ReviewSequence),
                InsightAction::new("View affected runs", ActionKind::ViewDetails),
            ],
            (_, false) => vec![
                InsightAction::new("Scale the playbooks driving this", ActionKind::ScalePlaybook),
                InsightAction::new("View details", ActionKind::ViewDetails),
            ],
            (_, true) => vec![
                InsightAction::new("Schedule a review", ActionKind::ScheduleReview),
                InsightAction::new("View details", ActionKind::ViewDetails),
            ],
        };

        out.push(Insight {
            id: format!("{insight_type}-{}", series.key()),
            insight_type,
            priority: policy.priority(Some(trend), critical),
            title: format!("{} {direction} {:.0}%", series.label(), trend.abs()),
            description: format!(
                "{} is {} against the average of the previous {windows} window(s).",
                series.label(),
                series.format(current),
            ),
            impact: impact(trend, share),
            effort: if falling { "Medium" } else { "Low" }.to_string(),
            evidence: vec![
                format!("Current: {}", series.format(current)),
                format!("Baseline: {} over {windows} prior window(s)", series.format(baseline)),
            ],
            actions,
            segment: series.segment(),
            channel: None,
        });
    }
    out
}

fn channel_gap_insights(inputs: &InsightInputs<'_>, policy: &InsightPolicy) -> Vec<Insight> {
    let matrix = inputs.response_matrix;
    if matrix.metric != MatrixMetric::ResponseRate {
        tracing::warn!(metric = %matrix.metric, "channel gaps need the response-rate matrix");
        return Vec::new();
    }

    let mut out = Vec::new();
    for segment in Segment::all() {
        let active: Vec<_> = matrix
            .cells
            .iter()
            .filter(|c| c.segment == *segment && c.counters.emails_sent > 0.0)
            .collect();
        let best = active.iter().max_by(|a, b| a.value.total_cmp(&b.value));
        let worst = active.iter().min_by(|a, b| a.value.total_cmp(&b.value));
        let (Some(best), Some(worst)) = (best, worst) else {
            continue;
        };
        let gap = best.value - worst.value;
        if best.channel == worst.channel || gap < policy.channel_gap_pct {
            continue;
        }

        let relative = pct_change(best.value, worst.value).unwrap_or(100.0);
        out.push(Insight {
            id: format!("opportunity-{segment}-{}", best.channel),
            insight_type: InsightType::Opportunity,
            priority: policy.priority(Some(relative), true),
            title: format!(
                "{} outperforms {} for {}",
                best.channel.label(),
                worst.channel.label(),
                segment.label()
            ),
            description: format!(
                "Shifting {} volume from {} toward {} could lift responses by about {gap:.0} points.",
                segment.label(),
                worst.channel.label(),
                best.channel.label(),
            ),
            impact: impact(relative, segment_share(inputs.grid, Some(*segment))),
            effort: "Low".to_string(),
            evidence: vec![format!(
                "{} responses average {:.0}% vs {} at {:.0}%",
                best.channel.label(),
                best.value,
                worst.channel.as_str(),
                worst.value
            )],
            actions: vec![
                InsightAction::new(
                    format!("Increase {} share", best.channel.label()),
                    ActionKind::AdjustChannelMix,
                ),
                InsightAction::new("Compare channels", ActionKind::ViewDetails),
            ],
            segment: Some(*segment),
            channel: Some(best.channel),
        });
    }
    out
}

fn health_insights(inputs: &InsightInputs<'_>) -> Vec<Insight> {
    let total_leads = inputs.grid.total().leads_targeted;
    inputs
        .health
        .attention()
        .into_iter()
        .map(|cell| {
            let share = if total_leads > 0.0 {
                cell.counters.leads_targeted / total_leads
            } else {
                0.0
            };
            let priority = match cell.tier {
                HealthTier::Critical => Priority::High,
                _ => Priority::Medium,
            };
            Insight {
                id: format!("optimization-health-{}-{}", cell.segment, cell.channel),
                insight_type: InsightType::Optimization,
                priority,
                title: format!(
                    "{} {} health is {}",
                    cell.segment.label(),
                    cell.channel.label(),
                    cell.tier
                ),
                description: format!(
                    "This cell scores {} out of 100 on combined response and meeting rates.",
                    cell.score
                ),
                impact: impact(f64::from(100 - cell.score.min(100)), share),
                effort: "Medium".to_string(),
                evidence: vec![
                    format!("Health score {} ({})", cell.score, cell.tier),
                    format!(
                        "Response rate {:.1}%, meeting rate {:.1}%",
                        cell.counters.response_rate(),
                        cell.counters.meeting_rate()
                    ),
                ],
                actions: vec![
                    InsightAction::new("Rebalance segment targeting", ActionKind::RebalanceSegment),
                    InsightAction::new("Review outreach sequence", ActionKind::ReviewSequence),
                ],
                segment: Some(cell.segment),
                channel: Some(cell.channel),
            }
        })
        .collect()
}

fn funnel_insight(funnel: &FunnelResult, policy: &InsightPolicy) -> Option<Insight> {
    let stage = funnel.biggest_drop()?;
    let idx = funnel.stages.iter().position(|s| s.name == stage.name)?;
    let previous = funnel.stages.get(idx.checked_sub(1)?)?;
    let conversion = stage.conversion_rate?;
    let lost = 100.0 - conversion;

    Some(Insight {
        id: format!("optimization-funnel-{}", stage.name),
        insight_type: InsightType::Optimization,
        priority: policy.priority(Some(lost), false),
        title: format!("Largest funnel drop: {} → {}", previous.name, stage.name),
        description: format!(
            "Only {conversion:.1}% of {} reach {}.",
            previous.name, stage.name
        ),
        impact: impact(lost, 1.0),
        effort: "Medium".to_string(),
        evidence: vec![format!(
            "{} {} → {} {} ({} lost)",
            previous.value,
            previous.name,
            stage.value,
            stage.name,
            stage.drop_off.unwrap_or_default()
        )],
        actions: vec![
            InsightAction::new("Review the sequence step", ActionKind::ReviewSequence),
            InsightAction::new("View funnel", ActionKind::ViewDetails),
        ],
        segment: None,
        channel: None,
    })
}

fn prediction_insight(timeline: &Timeline) -> Option<Insight> {
    let completed: Vec<_> = timeline
        .entries
        .iter()
        .filter(|e| e.status == RunStatus::Completed)
        .collect();
    if completed.is_empty() {
        return None;
    }
    let per_run = mean(&completed.iter().map(|e| e.meetings_booked as f64).collect::<Vec<_>>());
    let cadence = timeline.summary.total_runs as f64;
    let predicted = per_run * cadence;
    let current = timeline.summary.total_meetings as f64;
    let delta = pct_change(predicted, current).unwrap_or(0.0);

    Some(Insight {
        id: "prediction-meetings".to_string(),
        insight_type: InsightType::Prediction,
        priority: Priority::Low,
        title: format!("About {predicted:.0} meetings expected next window"),
        description: "Projected from the completed-run meeting average at the current run cadence."
            .to_string(),
        impact: impact(delta, 1.0),
        effort: "Low".to_string(),
        evidence: vec![
            format!("{} completed runs averaged {per_run:.1} meetings", completed.len()),
            format!("{} runs started this window", timeline.summary.total_runs),
        ],
        actions: vec![InsightAction::new("Schedule a pipeline review", ActionKind::ScheduleReview)],
        segment: None,
        channel: None,
    })
}
