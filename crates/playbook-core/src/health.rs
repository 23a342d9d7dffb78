use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grid::{CellGrid, CellKey};
use crate::metrics::{mean, pct_change, Counters};
use crate::types::{Channel, Segment};

// ---------------------------------------------------------------------------
// HealthPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    #[serde(default = "default_excellent")]
    pub excellent: u32,
    #[serde(default = "default_good")]
    pub good: u32,
    #[serde(default = "default_fair")]
    pub fair: u32,
    #[serde(default = "default_poor")]
    pub poor: u32,
}

fn default_excellent() -> u32 {
    80
}

fn default_good() -> u32 {
    60
}

fn default_fair() -> u32 {
    40
}

fn default_poor() -> u32 {
    20
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            excellent: default_excellent(),
            good: default_good(),
            fair: default_fair(),
            poor: default_poor(),
        }
    }
}

/// Weighting for the per-cell composite health score.
///
/// Each rate is divided by its ceiling and clamped to 0–100 before weighting,
/// so a ceiling of 50 means a 50% response rate already earns the full term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    #[serde(default = "default_response_weight")]
    pub response_weight: f64,
    #[serde(default = "default_meeting_weight")]
    pub meeting_weight: f64,
    #[serde(default = "default_ceiling")]
    pub response_rate_ceiling: f64,
    #[serde(default = "default_ceiling")]
    pub meeting_rate_ceiling: f64,
    #[serde(default)]
    pub thresholds: HealthThresholds,
}

fn default_response_weight() -> f64 {
    0.6
}

fn default_meeting_weight() -> f64 {
    0.4
}

fn default_ceiling() -> f64 {
    100.0
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            response_weight: default_response_weight(),
            meeting_weight: default_meeting_weight(),
            response_rate_ceiling: default_ceiling(),
            meeting_rate_ceiling: default_ceiling(),
            thresholds: HealthThresholds::default(),
        }
    }
}

fn normalize(rate: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 {
        return 0.0;
    }
    (rate / ceiling * 100.0).clamp(0.0, 100.0)
}

impl HealthPolicy {
    /// Composite 0–100 score for a cell's counters.
    pub fn score(&self, counters: &Counters) -> u32 {
        let a = normalize(counters.response_rate(), self.response_rate_ceiling);
        let b = normalize(counters.meeting_rate(), self.meeting_rate_ceiling);
        let raw = a * self.response_weight + b * self.meeting_weight;
        if !raw.is_finite() {
            return 0;
        }
        raw.clamp(0.0, 100.0).round() as u32
    }

    pub fn tier(&self, score: u32) -> HealthTier {
        let t = &self.thresholds;
        if score >= t.excellent {
            HealthTier::Excellent
        } else if score >= t.good {
            HealthTier::Good
        } else if score >= t.fair {
            HealthTier::Fair
        } else if score >= t.poor {
            HealthTier::Poor
        } else {
            HealthTier::Critical
        }
    }
}

// ---------------------------------------------------------------------------
// HealthTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthTier {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthTier::Excellent => "excellent",
            HealthTier::Good => "good",
            HealthTier::Fair => "fair",
            HealthTier::Poor => "poor",
            HealthTier::Critical => "critical",
        }
    }

    pub fn needs_attention(self) -> bool {
        matches!(self, HealthTier::Poor | HealthTier::Critical)
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HealthGrid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCell {
    pub segment: Segment,
    pub channel: Channel,
    pub score: u32,
    pub tier: HealthTier,
    pub counters: Counters,
    /// False when the cell saw no outreach in the window.
    pub has_data: bool,
    pub trend: Option<f64>,
}

impl HealthCell {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.segment, self.channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthGrid {
    pub cells: Vec<HealthCell>,
    /// Mean score over cells with data; 0 when none have any.
    pub average_score: f64,
}

impl HealthGrid {
    pub fn cell(&self, segment: Segment, channel: Channel) -> Option<&HealthCell> {
        self.cells
            .iter()
            .find(|c| c.segment == segment && c.channel == channel)
    }

    /// Cells with data in the poor or critical tiers, worst first.
    pub fn attention(&self) -> Vec<&HealthCell> {
        let mut cells: Vec<&HealthCell> = self
            .cells
            .iter()
            .filter(|c| c.has_data && c.tier.needs_attention())
            .collect();
        cells.sort_by_key(|c| (c.score, c.key()));
        cells
    }
}

pub fn score_grid(grid: &CellGrid, prior: Option<&CellGrid>, policy: &HealthPolicy) -> HealthGrid {
    let cells: Vec<HealthCell> = grid
        .iter()
        .map(|(key, counters)| {
            let score = policy.score(counters);
            let trend = prior.and_then(|p| {
                let prior_score = policy.score(&p.get(key));
                pct_change(f64::from(score), f64::from(prior_score))
            });
            HealthCell {
                segment: key.segment,
                channel: key.channel,
                score,
                tier: policy.tier(score),
                counters: *counters,
                has_data: !counters.is_empty(),
                trend,
            }
        })
        .collect();

    let scored: Vec<f64> = cells
        .iter()
        .filter(|c| c.has_data)
        .map(|c| f64::from(c.score))
        .collect();

    HealthGrid {
        average_score: mean(&scored),
        cells,
    }
}
