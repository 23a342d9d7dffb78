use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// QualityIssueKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueKind {
    NegativeCount,
    CountOutOfRange,
    MissingCount,
    MissingTimestamp,
    InvalidTimestamp,
    UnknownStatus,
    UnknownEnum,
    ChannelMixNormalized,
    ChannelMixMissing,
    OrphanRun,
    DuplicateId,
    OverlappingRun,
}

impl QualityIssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityIssueKind::NegativeCount => "negative_count",
            QualityIssueKind::CountOutOfRange => "count_out_of_range",
            QualityIssueKind::MissingCount => "missing_count",
            QualityIssueKind::MissingTimestamp => "missing_timestamp",
            QualityIssueKind::InvalidTimestamp => "invalid_timestamp",
            QualityIssueKind::UnknownStatus => "unknown_status",
            QualityIssueKind::UnknownEnum => "unknown_enum",
            QualityIssueKind::ChannelMixNormalized => "channel_mix_normalized",
            QualityIssueKind::ChannelMixMissing => "channel_mix_missing",
            QualityIssueKind::OrphanRun => "orphan_run",
            QualityIssueKind::DuplicateId => "duplicate_id",
            QualityIssueKind::OverlappingRun => "overlapping_run",
        }
    }
}

impl fmt::Display for QualityIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QualityIssue
// ---------------------------------------------------------------------------

/// A repair the sanitizer or repository applied to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: QualityIssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
}

impl QualityIssue {
    pub fn new(kind: QualityIssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            detail: detail.into(),
        }
    }

    pub fn on_field(kind: QualityIssueKind, field: &str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: Some(field.to_string()),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityEntry / QualityReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Playbook,
    Run,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEntry {
    pub record_kind: RecordKind,
    pub record_id: String,
    pub issue: QualityIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub entries: Vec<QualityEntry>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: QualityIssueKind) -> usize {
        self.entries.iter().filter(|e| e.issue.kind == kind).count()
    }

    pub fn for_record(&self, record_id: &str) -> Vec<&QualityIssue> {
        self.entries
            .iter()
            .filter(|e| e.record_id == record_id)
            .map(|e| &e.issue)
            .collect()
    }

    /// "3 issues across 2 records"
    pub fn summarize(&self) -> String {
        let records: std::collections::HashSet<&str> =
            self.entries.iter().map(|e| e.record_id.as_str()).collect();
        format!(
            "{} issues across {} records",
            self.entries.len(),
            records.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_by_kind_and_record() {
        let report = QualityReport {
            entries: vec![
                QualityEntry {
                    record_kind: RecordKind::Run,
                    record_id: "r1".into(),
                    issue: QualityIssue::on_field(
                        QualityIssueKind::NegativeCount,
                        "responses",
                        "-3 replaced with 0",
                    ),
                },
                QualityEntry {
                    record_kind: RecordKind::Run,
                    record_id: "r1".into(),
                    issue: QualityIssue::new(QualityIssueKind::MissingTimestamp, "started_at"),
                },
                QualityEntry {
                    record_kind: RecordKind::Playbook,
                    record_id: "p1".into(),
                    issue: QualityIssue::new(QualityIssueKind::ChannelMixMissing, "empty"),
                },
            ],
        };
        assert!(!report.is_clean());
        assert_eq!(report.count(QualityIssueKind::NegativeCount), 1);
        assert_eq!(report.for_record("r1").len(), 2);
        assert_eq!(report.summarize(), "3 issues across 2 records");
    }

    #[test]
    fn issue_field_skipped_when_absent() {
        let issue = QualityIssue::new(QualityIssueKind::OrphanRun, "no playbook p9");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(!json.contains("field"));
        assert!(json.contains("\"orphan_run\""));
    }
}
