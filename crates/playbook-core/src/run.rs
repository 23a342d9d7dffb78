use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::percentage;
use crate::quality::{QualityIssue, QualityIssueKind};
use crate::types::RunStatus;

// ---------------------------------------------------------------------------
// PlaybookRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookRun {
    pub id: String,
    pub playbook_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub leads_targeted: u64,
    pub emails_sent: u64,
    pub responses: u64,
    pub meetings_booked: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality: Vec<QualityIssue>,
}

impl PlaybookRun {
    /// `responses / emails_sent * 100`, 0 when nothing was sent.
    pub fn response_rate(&self) -> f64 {
        percentage(self.responses as f64, self.emails_sent as f64)
    }

    /// `meetings_booked / responses * 100`, 0 without responses.
    pub fn meeting_rate(&self) -> f64 {
        percentage(self.meetings_booked as f64, self.responses as f64)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// End of the interval during which this run held its playbook's slot.
    /// Open-ended for runs that have not finished.
    pub fn active_until(&self) -> Option<DateTime<Utc>> {
        match self.status {
            RunStatus::Completed | RunStatus::Failed => {
                Some(self.completed_at.unwrap_or(self.started_at))
            }
            RunStatus::Pending | RunStatus::Unclassified => Some(self.started_at),
            RunStatus::Running | RunStatus::Paused => self.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// RunRecord (lenient wire form)
// ---------------------------------------------------------------------------

/// A run as delivered by the telemetry collaborator, before sanitizing.
///
/// Counters are read as `f64` so negative, fractional or absent values can be
/// repaired instead of failing the whole payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub playbook_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub leads_targeted: Option<f64>,
    #[serde(default, alias = "messages_sent")]
    pub emails_sent: Option<f64>,
    #[serde(default)]
    pub responses: Option<f64>,
    #[serde(default)]
    pub meetings_booked: Option<f64>,
}

impl RunRecord {
    /// Convert to a [`PlaybookRun`], replacing bad values with safe defaults
    /// and attaching a marker for each repair.
    pub fn sanitize(self) -> PlaybookRun {
        let mut quality = Vec::new();

        let status = match self.status.as_deref().map(str::trim) {
            Some(s) => s.to_ascii_lowercase().parse().unwrap_or_else(|_| {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::UnknownStatus,
                    "status",
                    format!("'{s}' treated as unclassified"),
                ));
                RunStatus::Unclassified
            }),
            None => {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::UnknownStatus,
                    "status",
                    "missing status treated as unclassified",
                ));
                RunStatus::Unclassified
            }
        };

        let started_at = match self.started_at.as_deref() {
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::InvalidTimestamp,
                    "started_at",
                    format!("'{raw}' replaced with epoch"),
                ));
                DateTime::<Utc>::UNIX_EPOCH
            }),
            None => {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::MissingTimestamp,
                    "started_at",
                    "missing start replaced with epoch",
                ));
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        let completed_at = self.completed_at.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                quality.push(QualityIssue::on_field(
                    QualityIssueKind::InvalidTimestamp,
                    "completed_at",
                    format!("'{raw}' dropped"),
                ));
            }
            parsed
        });

        PlaybookRun {
            id: self.id,
            playbook_id: self.playbook_id,
            status,
            started_at,
            completed_at,
            leads_targeted: sanitize_count(self.leads_targeted, "leads_targeted", &mut quality),
            emails_sent: sanitize_count(self.emails_sent, "emails_sent", &mut quality),
            responses: sanitize_count(self.responses, "responses", &mut quality),
            meetings_booked: sanitize_count(self.meetings_booked, "meetings_booked", &mut quality),
            quality,
        }
    }
}

impl From<PlaybookRun> for RunRecord {
    fn from(run: PlaybookRun) -> Self {
        Self {
            id: run.id,
            playbook_id: run.playbook_id,
            status: Some(run.status.to_string()),
            started_at: Some(run.started_at.to_rfc3339()),
            completed_at: run.completed_at.map(|t| t.to_rfc3339()),
            leads_targeted: Some(run.leads_targeted as f64),
            emails_sent: Some(run.emails_sent as f64),
            responses: Some(run.responses as f64),
            meetings_booked: Some(run.meetings_booked as f64),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Largest count accepted from the API; every integer up to it survives the
/// `f64` wire representation exactly.
pub const MAX_COUNT: u64 = 1 << 53;

fn sanitize_count(value: Option<f64>, field: &str, quality: &mut Vec<QualityIssue>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 && v <= MAX_COUNT as f64 => v.floor() as u64,
        Some(v) if v > 0.0 => {
            quality.push(QualityIssue::on_field(
                QualityIssueKind::CountOutOfRange,
                field,
                format!("{v} capped at {MAX_COUNT}"),
            ));
            MAX_COUNT
        }
        Some(v) => {
            quality.push(QualityIssue::on_field(
                QualityIssueKind::NegativeCount,
                field,
                format!("{v} replaced with 0"),
            ));
            0
        }
        None => {
            quality.push(QualityIssue::on_field(
                QualityIssueKind::MissingCount,
                field,
                "missing count replaced with 0",
            ));
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn completed_run() -> PlaybookRun {
        PlaybookRun {
            id: "run-1".into(),
            playbook_id: "pb-1".into(),
            status: RunStatus::Completed,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            completed_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 11, 30, 0).unwrap()),
            leads_targeted: 150,
            emails_sent: 100,
            responses: 20,
            meetings_booked: 5,
            quality: vec![],
        }
    }

    #[test]
    fn run_rates() {
        let run = completed_run();
        assert_eq!(run.response_rate(), 20.0);
        assert_eq!(run.meeting_rate(), 25.0);
    }

    #[test]
    fn rates_are_zero_without_denominators() {
        let mut run = completed_run();
        run.emails_sent = 0;
        run.responses = 0;
        assert_eq!(run.response_rate(), 0.0);
        assert_eq!(run.meeting_rate(), 0.0);
    }

    #[test]
    fn playbook_run_json_roundtrip() {
        for status in RunStatus::all() {
            let mut run = completed_run();
            run.status = *status;
            let json = serde_json::to_string(&run).unwrap();
            let parsed: PlaybookRun = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, run);
            assert_eq!(parsed.status, *status);
        }
    }

    #[test]
    fn roundtrip_with_null_completed_at() {
        let mut run = completed_run();
        run.status = RunStatus::Running;
        run.completed_at = None;
        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"completed_at\":null"));
        let parsed: PlaybookRun = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
    }

    #[test]
    fn sanitize_clean_record_roundtrips() {
        let run = completed_run();
        let record = RunRecord::from(run.clone());
        assert_eq!(record.sanitize(), run);
    }

    #[test]
    fn sanitize_negative_and_missing_counts() {
        let json = r#"{
            "id": "run-bad",
            "playbook_id": "pb-1",
            "status": "completed",
            "started_at": "2026-03-01T09:00:00Z",
            "leads_targeted": -4,
            "messages_sent": 50,
            "responses": 7.9
        }"#;
        let record: RunRecord = serde_json::from_str(json).unwrap();
        let run = record.sanitize();
        assert_eq!(run.leads_targeted, 0);
        assert_eq!(run.emails_sent, 50);
        assert_eq!(run.responses, 7);
        assert_eq!(run.meetings_booked, 0);
        let kinds: Vec<_> = run.quality.iter().map(|q| q.kind).collect();
        assert_eq!(
            kinds,
            vec![QualityIssueKind::NegativeCount, QualityIssueKind::MissingCount]
        );
        assert_eq!(run.quality[0].field.as_deref(), Some("leads_targeted"));
    }

    #[test]
    fn sanitize_caps_huge_counts() {
        let json = r#"{
            "id": "run-huge",
            "playbook_id": "pb-1",
            "status": "completed",
            "started_at": "2026-03-01T09:00:00Z",
            "leads_targeted": 1e20,
            "emails_sent": 10,
            "responses": 1,
            "meetings_booked": 0
        }"#;
        let record: RunRecord = serde_json::from_str(json).unwrap();
        let run = record.sanitize();
        assert_eq!(run.leads_targeted, MAX_COUNT);
        assert_eq!(run.quality.len(), 1);
        assert_eq!(run.quality[0].kind, QualityIssueKind::CountOutOfRange);
        assert_eq!(run.quality[0].field.as_deref(), Some("leads_targeted"));
    }

    #[test]
    fn sanitize_missing_and_bad_timestamps() {
        let record = RunRecord {
            id: "run-2".into(),
            playbook_id: "pb-1".into(),
            status: Some("RUNNING".into()),
            started_at: None,
            completed_at: Some("yesterday".into()),
            leads_targeted: Some(1.0),
            emails_sent: Some(1.0),
            responses: Some(0.0),
            meetings_booked: Some(0.0),
        };
        let run = record.sanitize();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.started_at, DateTime::<Utc>::UNIX_EPOCH);
        assert!(run.completed_at.is_none());
        assert_eq!(run.quality[0].kind, QualityIssueKind::MissingTimestamp);
        assert_eq!(run.quality[1].kind, QualityIssueKind::InvalidTimestamp);
    }

    #[test]
    fn sanitize_unknown_status() {
        let record = RunRecord {
            id: "run-3".into(),
            status: Some("throttled".into()),
            started_at: Some("2026-03-01T09:00:00+02:00".into()),
            leads_targeted: Some(0.0),
            emails_sent: Some(0.0),
            responses: Some(0.0),
            meetings_booked: Some(0.0),
            ..Default::default()
        };
        let run = record.sanitize();
        assert_eq!(run.status, RunStatus::Unclassified);
        assert_eq!(run.started_at, Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap());
        assert_eq!(run.quality.len(), 1);
    }

    #[test]
    fn active_until_is_open_for_running() {
        let mut run = completed_run();
        assert!(run.active_until().is_some());
        run.status = RunStatus::Running;
        run.completed_at = None;
        assert!(run.active_until().is_none());
    }
}
