use serde::{Deserialize, Serialize};

use crate::metrics::checked_percentage;
use crate::run::PlaybookRun;

// ---------------------------------------------------------------------------
// FunnelSnapshot (input)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStageCount {
    pub name: String,
    pub value: u64,
}

/// Ordered stage counts. Each stage is expected to be a subset of the one
/// before it; that is trusted, not enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelSnapshot {
    pub stages: Vec<FunnelStageCount>,
}

impl FunnelSnapshot {
    pub fn new<S: Into<String>>(stages: impl IntoIterator<Item = (S, u64)>) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|(name, value)| FunnelStageCount {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }

    /// Standard outreach funnel: leads → contacted → responded → meetings.
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a PlaybookRun>) -> Self {
        let (mut leads, mut contacted, mut responded, mut meetings) = (0u64, 0u64, 0u64, 0u64);
        for run in runs {
            leads = leads.saturating_add(run.leads_targeted);
            contacted = contacted.saturating_add(run.emails_sent);
            responded = responded.saturating_add(run.responses);
            meetings = meetings.saturating_add(run.meetings_booked);
        }
        Self::new([
            ("leads", leads),
            ("contacted", contacted),
            ("responded", responded),
            ("meetings", meetings),
        ])
    }

    pub fn aggregate(&self) -> FunnelResult {
        aggregate(self)
    }
}

// ---------------------------------------------------------------------------
// FunnelResult (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub name: String,
    pub value: u64,
    /// `value / previous * 100`; null for the first stage or a zero predecessor.
    pub conversion_rate: Option<f64>,
    /// `previous - value`; negative when a stage outgrows its predecessor.
    pub drop_off: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelResult {
    pub stages: Vec<FunnelStage>,
    pub overall_conversion: Option<f64>,
}

impl FunnelResult {
    /// Stage (after the first) losing the largest share of its predecessor.
    pub fn biggest_drop(&self) -> Option<&FunnelStage> {
        self.stages
            .iter()
            .filter_map(|s| s.conversion_rate.map(|c| (s, 100.0 - c)))
            .filter(|(_, lost)| *lost > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s)
    }
}

pub fn aggregate(snapshot: &FunnelSnapshot) -> FunnelResult {
    let mut stages = Vec::with_capacity(snapshot.stages.len());
    let mut previous: Option<u64> = None;

    for stage in &snapshot.stages {
        let (conversion_rate, drop_off) = match previous {
            Some(prev) => (
                checked_percentage(stage.value as f64, prev as f64),
                Some(signed_drop(prev, stage.value)),
            ),
            None => (None, None),
        };
        stages.push(FunnelStage {
            name: stage.name.clone(),
            value: stage.value,
            conversion_rate,
            drop_off,
        });
        previous = Some(stage.value);
    }

    let overall_conversion = match (snapshot.stages.first(), snapshot.stages.last()) {
        (Some(first), Some(last)) => checked_percentage(last.value as f64, first.value as f64),
        _ => None,
    };

    FunnelResult {
        stages,
        overall_conversion,
    }
}

/// `prev - value`, saturating at the `i64` bounds.
fn signed_drop(prev: u64, value: u64) -> i64 {
    let diff = i128::from(prev) - i128::from(value);
    i64::try_from(diff).unwrap_or(if diff > 0 { i64::MAX } else { i64::MIN })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
