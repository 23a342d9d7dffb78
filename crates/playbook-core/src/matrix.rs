use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AnalyticsError;
use crate::grid::{CellGrid, CellKey};
use crate::metrics::{mean, pct_change, Counters};
use crate::types::{Channel, Segment};

// ---------------------------------------------------------------------------
// MatrixMetric
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixMetric {
    LeadsTargeted,
    EmailsSent,
    Responses,
    Meetings,
    ResponseRate,
    MeetingRate,
    Roi,
}

impl MatrixMetric {
    pub fn all() -> &'static [MatrixMetric] {
        &[
            MatrixMetric::LeadsTargeted,
            MatrixMetric::EmailsSent,
            MatrixMetric::Responses,
            MatrixMetric::Meetings,
            MatrixMetric::ResponseRate,
            MatrixMetric::MeetingRate,
            MatrixMetric::Roi,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatrixMetric::LeadsTargeted => "leads_targeted",
            MatrixMetric::EmailsSent => "emails_sent",
            MatrixMetric::Responses => "responses",
            MatrixMetric::Meetings => "meetings",
            MatrixMetric::ResponseRate => "response_rate",
            MatrixMetric::MeetingRate => "meeting_rate",
            MatrixMetric::Roi => "roi",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatrixMetric::LeadsTargeted => "Leads targeted",
            MatrixMetric::EmailsSent => "Messages sent",
            MatrixMetric::Responses => "Responses",
            MatrixMetric::Meetings => "Meetings booked",
            MatrixMetric::ResponseRate => "Response rate",
            MatrixMetric::MeetingRate => "Meeting rate",
            MatrixMetric::Roi => "ROI",
        }
    }

    /// Rates are shown with a `%` suffix.
    pub fn is_percentage(self) -> bool {
        matches!(self, MatrixMetric::ResponseRate | MatrixMetric::MeetingRate)
    }

    pub fn value(self, counters: &Counters, roi: &RoiConfig) -> f64 {
        match self {
            MatrixMetric::LeadsTargeted => counters.leads_targeted,
            MatrixMetric::EmailsSent => counters.emails_sent,
            MatrixMetric::Responses => counters.responses,
            MatrixMetric::Meetings => counters.meetings,
            MatrixMetric::ResponseRate => counters.response_rate(),
            MatrixMetric::MeetingRate => counters.meeting_rate(),
            MatrixMetric::Roi => roi.roi(counters),
        }
    }
}

impl fmt::Display for MatrixMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatrixMetric {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leads_targeted" | "leads" => Ok(MatrixMetric::LeadsTargeted),
            "emails_sent" | "messages_sent" => Ok(MatrixMetric::EmailsSent),
            "responses" => Ok(MatrixMetric::Responses),
            "meetings" | "meetings_booked" => Ok(MatrixMetric::Meetings),
            "response_rate" => Ok(MatrixMetric::ResponseRate),
            "meeting_rate" => Ok(MatrixMetric::MeetingRate),
            "roi" => Ok(MatrixMetric::Roi),
            _ => Err(AnalyticsError::UnknownMetric(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    #[serde(default = "default_meeting_value")]
    pub meeting_value: f64,
    #[serde(default = "default_cost_per_message")]
    pub cost_per_message: f64,
}

fn default_meeting_value() -> f64 {
    500.0
}

fn default_cost_per_message() -> f64 {
    2.0
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            meeting_value: default_meeting_value(),
            cost_per_message: default_cost_per_message(),
        }
    }
}

impl RoiConfig {
    /// Meeting value returned per unit of outreach spend; 0 without spend.
    pub fn roi(&self, counters: &Counters) -> f64 {
        let spend = counters.emails_sent * self.cost_per_message;
        if spend > 0.0 {
            counters.meetings * self.meeting_value / spend
        } else {
            0.0
        }
    }
}

/// Minimum value/benchmark ratios for each tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_excellent_ratio")]
    pub excellent: f64,
    #[serde(default = "default_good_ratio")]
    pub good: f64,
    #[serde(default = "default_average_ratio")]
    pub average: f64,
    #[serde(default = "default_below_average_ratio")]
    pub below_average: f64,
}

fn default_excellent_ratio() -> f64 {
    1.2
}

fn default_good_ratio() -> f64 {
    1.0
}

fn default_average_ratio() -> f64 {
    0.8
}

fn default_below_average_ratio() -> f64 {
    0.6
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            excellent: default_excellent_ratio(),
            good: default_good_ratio(),
            average: default_average_ratio(),
            below_average: default_below_average_ratio(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixPolicy {
    #[serde(default)]
    pub thresholds: TierThresholds,
    /// Metrics where a smaller value is the better outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lower_is_better: Vec<MatrixMetric>,
    #[serde(default)]
    pub roi: RoiConfig,
}

impl MatrixPolicy {
    pub fn is_lower_better(&self, metric: MatrixMetric) -> bool {
        self.lower_is_better.contains(&metric)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Average,
    BelowAverage,
    Poor,
}

impl PerformanceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceTier::Excellent => "excellent",
            PerformanceTier::Good => "good",
            PerformanceTier::Average => "average",
            PerformanceTier::BelowAverage => "below_average",
            PerformanceTier::Poor => "poor",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `value / benchmark`, inverted for lower-is-better metrics.
///
/// A zero benchmark means every compared value is zero, so the ratio is 1.
/// A zero value on a lower-is-better metric is unbounded.
pub fn benchmark_ratio(value: f64, benchmark: f64, lower_is_better: bool) -> f64 {
    if benchmark <= 0.0 {
        return 1.0;
    }
    if lower_is_better {
        if value <= 0.0 {
            f64::INFINITY
        } else {
            benchmark / value
        }
    } else {
        value / benchmark
    }
}

pub fn tier_for_ratio(ratio: f64, thresholds: &TierThresholds) -> PerformanceTier {
    if ratio >= thresholds.excellent {
        PerformanceTier::Excellent
    } else if ratio >= thresholds.good {
        PerformanceTier::Good
    } else if ratio >= thresholds.average {
        PerformanceTier::Average
    } else if ratio >= thresholds.below_average {
        PerformanceTier::BelowAverage
    } else {
        PerformanceTier::Poor
    }
}

/// Pure classification of a value against its benchmark.
pub fn classify(
    value: f64,
    benchmark: f64,
    lower_is_better: bool,
    thresholds: &TierThresholds,
) -> (f64, PerformanceTier) {
    let ratio = benchmark_ratio(value, benchmark, lower_is_better);
    (ratio, tier_for_ratio(ratio, thresholds))
}

// ---------------------------------------------------------------------------
// BenchmarkMatrix
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub segment: Segment,
    pub channel: Channel,
    pub counters: Counters,
    pub value: f64,
    pub benchmark: f64,
    /// Null when unbounded (zero value on a lower-is-better metric).
    pub ratio: Option<f64>,
    /// Percent change against the prior window; null without prior data.
    pub trend: Option<f64>,
    pub tier: PerformanceTier,
}

impl MatrixCell {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.segment, self.channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMatrix {
    pub metric: MatrixMetric,
    pub lower_is_better: bool,
    pub benchmark: f64,
    pub cells: Vec<MatrixCell>,
    pub row_averages: BTreeMap<Segment, f64>,
    pub column_averages: BTreeMap<Channel, f64>,
}

impl BenchmarkMatrix {
    pub fn cell(&self, segment: Segment, channel: Channel) -> Option<&MatrixCell> {
        self.cells
            .iter()
            .find(|c| c.segment == segment && c.channel == channel)
    }

    /// Best-ranked cell for the metric's direction.
    pub fn best(&self) -> Option<&MatrixCell> {
        let iter = self.cells.iter();
        if self.lower_is_better {
            iter.min_by(|a, b| a.value.total_cmp(&b.value))
        } else {
            iter.max_by(|a, b| a.value.total_cmp(&b.value))
        }
    }

    pub fn tier_counts(&self) -> BTreeMap<PerformanceTier, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.cells {
            *counts.entry(c.tier).or_insert(0) += 1;
        }
        counts
    }
}

/// Build the segment×channel matrix for `metric`.
///
/// `prior` is the same grid for the preceding window; it only feeds trends.
/// Counters in `grid` are read, never modified.
pub fn compute(
    grid: &CellGrid,
    prior: Option<&CellGrid>,
    metric: MatrixMetric,
    policy: &MatrixPolicy,
) -> BenchmarkMatrix {
    let lower_is_better = policy.is_lower_better(metric);
    let values: Vec<(CellKey, Counters, f64)> = grid
        .iter()
        .map(|(key, counters)| (key, *counters, metric.value(counters, &policy.roi)))
        .collect();

    let all_values: Vec<f64> = values.iter().map(|(_, _, v)| *v).collect();
    let benchmark = mean(&all_values);

    let row_averages = Segment::all()
        .iter()
        .map(|s| {
            let row: Vec<f64> = values
                .iter()
                .filter(|(k, _, _)| k.segment == *s)
                .map(|(_, _, v)| *v)
                .collect();
            (*s, mean(&row))
        })
        .collect();

    let column_averages = Channel::all()
        .iter()
        .map(|c| {
            let col: Vec<f64> = values
                .iter()
                .filter(|(k, _, _)| k.channel == *c)
                .map(|(_, _, v)| *v)
                .collect();
            (*c, mean(&col))
        })
        .collect();

    let cells = values
        .into_iter()
        .map(|(key, counters, value)| {
            let (ratio, tier) = classify(value, benchmark, lower_is_better, &policy.thresholds);
            let trend = prior.and_then(|p| {
                let prior_value = metric.value(&p.get(key), &policy.roi);
                pct_change(value, prior_value)
            });
            MatrixCell {
                segment: key.segment,
                channel: key.channel,
                counters,
                value,
                benchmark,
                ratio: ratio.is_finite().then_some(ratio),
                trend,
                tier,
            }
        })
        .collect();

    tracing::debug!(metric = %metric, benchmark, "computed benchmark matrix");

    BenchmarkMatrix {
        metric,
        lower_is_better,
        benchmark,
        cells,
        row_averages,
        column_averages,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
