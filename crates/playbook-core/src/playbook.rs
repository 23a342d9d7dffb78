use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::quality::{QualityIssue, QualityIssueKind};
use crate::types::{Channel, Goal, PlaybookStatus, Segment};

/// Deviation from 100 tolerated before a channel mix is renormalized.
const MIX_TOLERANCE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Playbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub segment: Segment,
    pub goal: Goal,
    /// Channel → percentage of outreach volume; sums to 100.
    pub channel_mix: BTreeMap<Channel, f64>,
    #[serde(default)]
    pub schedule_frequency: String,
    pub status: PlaybookStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality: Vec<QualityIssue>,
}

impl Playbook {
    /// Fraction (0..=1) of this playbook's volume that goes through `channel`.
    pub fn channel_share(&self, channel: Channel) -> f64 {
        let total: f64 = self.channel_mix.values().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.channel_mix.get(&channel).copied().unwrap_or(0.0) / total
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, PlaybookStatus::Active)
    }
}

// ---------------------------------------------------------------------------
// PlaybookRecord (lenient wire form)
// ---------------------------------------------------------------------------

/// Playbook as it arrives from the run-control API, before sanitizing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub channel_mix: BTreeMap<String, f64>,
    #[serde(default)]
    pub schedule_frequency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl PlaybookRecord {
    /// Convert to a [`Playbook`], repairing anything malformed.
    pub fn sanitize(self) -> Playbook {
        let mut quality = Vec::new();

        let segment = parse_or(
            self.segment.as_deref(),
            "segment",
            Segment::Midmarket,
            &mut quality,
        );
        let goal = parse_or(self.goal.as_deref(), "goal", Goal::Meetings, &mut quality);
        let status = parse_or(
            self.status.as_deref(),
            "status",
            PlaybookStatus::Draft,
            &mut quality,
        );

        let mut mix = BTreeMap::new();
        for (key, pct) in self.channel_mix {
            match Channel::from_str(&key) {
                Ok(channel) if pct.is_finite() && pct > 0.0 => {
                    *mix.entry(channel).or_insert(0.0) += pct;
                }
                Ok(_) => {}
                Err(_) => quality.push(QualityIssue::on_field(
                    QualityIssueKind::UnknownEnum,
                    "channel_mix",
                    format!("unknown channel '{key}' dropped"),
                )),
            }
        }

        let channel_mix = normalize_mix(mix, &mut quality);

        Playbook {
            id: self.id,
            name: self.name,
            segment,
            goal,
            channel_mix,
            schedule_frequency: self.schedule_frequency.unwrap_or_default(),
            status,
            quality,
        }
    }
}

impl From<Playbook> for PlaybookRecord {
    fn from(p: Playbook) -> Self {
        Self {
            id: p.id,
            name: p.name,
            segment: Some(p.segment.to_string()),
            goal: Some(p.goal.to_string()),
            channel_mix: p
                .channel_mix
                .into_iter()
                .map(|(c, pct)| (c.to_string(), pct))
                .collect(),
            schedule_frequency: Some(p.schedule_frequency),
            status: Some(p.status.to_string()),
        }
    }
}

fn parse_or<T: FromStr>(
    raw: Option<&str>,
    field: &str,
    fallback: T,
    quality: &mut Vec<QualityIssue>,
) -> T {
    match raw.map(str::trim) {
        Some(s) => match s.to_ascii_lowercase().parse() {
            Ok(v) => v,
            Err(_) => {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::UnknownEnum,
                    field,
                    format!("unknown value '{s}' replaced with default"),
                ));
                fallback
            }
        },
        None => {
            quality.push(QualityIssue::on_field(
                QualityIssueKind::UnknownEnum,
                field,
                "missing value replaced with default",
            ));
            fallback
        }
    }
}

fn normalize_mix(
    mix: BTreeMap<Channel, f64>,
    quality: &mut Vec<QualityIssue>,
) -> BTreeMap<Channel, f64> {
    let total: f64 = mix.values().sum();
    if mix.is_empty() || total <= 0.0 {
        quality.push(QualityIssue::on_field(
            QualityIssueKind::ChannelMixMissing,
            "channel_mix",
            "no usable channels; assuming 100% email",
        ));
        return BTreeMap::from([(Channel::Email, 100.0)]);
    }
    if (total - 100.0).abs() <= MIX_TOLERANCE {
        return mix;
    }
    quality.push(QualityIssue::on_field(
        QualityIssueKind::ChannelMixNormalized,
        "channel_mix",
        format!("mix summed to {total:.1}; scaled to 100"),
    ));
    mix.into_iter()
        .map(|(c, pct)| (c, pct / total * 100.0))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
