use crate::error::{AnalyticsError, Result};
use crate::health::HealthPolicy;
use crate::insight::InsightPolicy;
use crate::matrix::MatrixPolicy;
use crate::paths;
use crate::timeline::RunScorePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Where the playbook collaborator API lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_buckets")]
    pub buckets: usize,
    #[serde(default = "default_range_days")]
    pub default_range_days: u32,
}

fn default_buckets() -> usize {
    7
}

fn default_range_days() -> u32 {
    30
}

/// Longest default window `validate` accepts without a warning.
pub const MAX_RANGE_DAYS: u32 = 3650;

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            default_range_days: default_range_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3142
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyticsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub health: HealthPolicy,
    #[serde(default)]
    pub run_score: RunScorePolicy,
    #[serde(default)]
    pub matrix: MatrixPolicy,
    #[serde(default)]
    pub insights: InsightPolicy,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AnalyticsConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        let Some(data) = crate::io::read_if_exists(&path)? else {
            return Err(AnalyticsError::NotInitialized);
        };
        let cfg: AnalyticsConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Defaults when the workspace has no config yet.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(AnalyticsError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.api.base_url.trim().is_empty() {
            warn(WarnLevel::Error, "api.base_url is empty".to_string());
        }
        if self.api.timeout_seconds == 0 {
            warn(
                WarnLevel::Error,
                "api.timeout_seconds is 0; every fetch would time out".to_string(),
            );
        }

        let weights = [
            ("health", self.health.response_weight, self.health.meeting_weight),
            (
                "run_score",
                self.run_score.response_weight,
                self.run_score.meeting_weight,
            ),
        ];
        for (section, a, b) in weights {
            if (a + b - 1.0).abs() > 1e-6 {
                warn(
                    WarnLevel::Warning,
                    format!("{section} weights sum to {:.2}, expected 1.00", a + b),
                );
            }
            if a < 0.0 || b < 0.0 {
                warn(WarnLevel::Error, format!("{section} has a negative weight"));
            }
        }

        let h = &self.health.thresholds;
        if !(h.excellent > h.good && h.good > h.fair && h.fair > h.poor) {
            warn(
                WarnLevel::Warning,
                "health.thresholds should be strictly descending (excellent > good > fair > poor)"
                    .to_string(),
            );
        }
        if h.excellent > 100 {
            warn(
                WarnLevel::Warning,
                format!("health.thresholds.excellent={} can never be reached", h.excellent),
            );
        }

        let m = &self.matrix.thresholds;
        if !(m.excellent > m.good && m.good > m.average && m.average > m.below_average) {
            warn(
                WarnLevel::Warning,
                "matrix.thresholds should be strictly descending".to_string(),
            );
        }
        if self.matrix.roi.cost_per_message <= 0.0 {
            warn(
                WarnLevel::Warning,
                "matrix.roi.cost_per_message <= 0; ROI will always be 0".to_string(),
            );
        }

        if self.insights.medium_trend_pct > self.insights.high_trend_pct {
            warn(
                WarnLevel::Warning,
                format!(
                    "insights.medium_trend_pct ({}) exceeds high_trend_pct ({})",
                    self.insights.medium_trend_pct, self.insights.high_trend_pct
                ),
            );
        }

        if self.insights.history_windows > crate::insight::MAX_HISTORY_WINDOWS {
            warn(
                WarnLevel::Warning,
                format!(
                    "insights.history_windows={} exceeds {}; only {} will be used",
                    self.insights.history_windows,
                    crate::insight::MAX_HISTORY_WINDOWS,
                    crate::insight::MAX_HISTORY_WINDOWS
                ),
            );
        }

        if self.timeline.default_range_days > MAX_RANGE_DAYS {
            warn(
                WarnLevel::Warning,
                format!(
                    "timeline.default_range_days={} exceeds {MAX_RANGE_DAYS}",
                    self.timeline.default_range_days
                ),
            );
        }

        if self.timeline.buckets == 0 {
            warn(
                WarnLevel::Warning,
                "timeline.buckets is 0; a single bucket will be used".to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
