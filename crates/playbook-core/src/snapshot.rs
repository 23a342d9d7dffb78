use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::playbook::{Playbook, PlaybookRecord};
use crate::run::{PlaybookRun, RunRecord};

// ---------------------------------------------------------------------------
// TelemetrySnapshot
// ---------------------------------------------------------------------------

/// An immutable set of sanitized playbooks and runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Set on snapshots produced by the sanitizer; raw collaborator payloads
    /// lack it and are sanitized on load.
    #[serde(default)]
    pub sanitized: bool,
    pub playbooks: Vec<Playbook>,
    pub runs: Vec<PlaybookRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Wire form: records exactly as the collaborator returns them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub playbooks: Vec<PlaybookRecord>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl TelemetrySnapshot {
    pub fn new(playbooks: Vec<Playbook>, runs: Vec<PlaybookRun>) -> Self {
        Self {
            sanitized: true,
            playbooks,
            runs,
            fetched_at: None,
        }
    }

    pub fn from_records(playbooks: Vec<PlaybookRecord>, runs: Vec<RunRecord>) -> Self {
        Self {
            sanitized: true,
            playbooks: playbooks.into_iter().map(PlaybookRecord::sanitize).collect(),
            runs: runs.into_iter().map(RunRecord::sanitize).collect(),
            fetched_at: None,
        }
    }

    pub fn with_fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(at);
        self
    }

    /// Parse a snapshot, accepting either the sanitized form or raw
    /// collaborator records.
    pub fn from_json(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        if value.get("sanitized").and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(serde_json::from_value(value)?);
        }
        let raw: RawSnapshot = serde_json::from_value(value)?;
        Ok(Self::from_records(raw.playbooks, raw.runs))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        crate::io::atomic_write(path, &data)
    }
}
