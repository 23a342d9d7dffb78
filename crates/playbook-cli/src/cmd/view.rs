use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use playbook_core::config::AnalyticsConfig;
use playbook_core::matrix::MatrixMetric;
use playbook_core::paths;
use playbook_core::report::ReportRequest;
use playbook_core::repository::RunRepository;
use playbook_core::snapshot::TelemetrySnapshot;
use playbook_core::timeline::TimelineFilter;
use playbook_core::types::RunStatus;
use playbook_core::window::TimeRange;
use std::path::Path;

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Config plus the repository built from the last fetched snapshot.
pub struct Workspace {
    pub config: AnalyticsConfig,
    pub snapshot: TelemetrySnapshot,
    pub repo: RunRepository,
}

impl Workspace {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = AnalyticsConfig::load_or_default(root).context("failed to load config")?;
        let path = paths::snapshot_path(root);
        if !path.exists() {
            anyhow::bail!(
                "no snapshot at {}; run 'playbook fetch' first",
                path.display()
            );
        }
        let snapshot = TelemetrySnapshot::load(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let repo = RunRepository::from_snapshot(&snapshot);
        Ok(Self {
            config,
            snapshot,
            repo,
        })
    }
}

// ---------------------------------------------------------------------------
// View arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default, Clone)]
pub struct ViewArgs {
    /// Matrix metric (leads_targeted, emails_sent, responses, meetings,
    /// response_rate, meeting_rate, roi)
    #[arg(long)]
    pub metric: Option<String>,

    /// Window start (RFC 3339)
    #[arg(long)]
    pub start: Option<String>,

    /// Window end (RFC 3339)
    #[arg(long)]
    pub end: Option<String>,

    /// Window length in days when only one bound (or none) is given
    #[arg(long)]
    pub days: Option<u32>,

    /// Only runs of this playbook (timeline)
    #[arg(long = "playbook")]
    pub playbook_id: Option<String>,

    /// Only runs in this status (timeline)
    #[arg(long)]
    pub status: Option<String>,

    /// Maximum number of insights; 0 for no cap
    #[arg(long)]
    pub limit: Option<usize>,

    /// Evaluate as of this instant instead of now (RFC 3339)
    #[arg(long)]
    pub as_of: Option<String>,
}

fn parse_time(flag: &str, value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid --{flag} '{value}'"))
}

impl ViewArgs {
    pub fn to_request(&self, config: &AnalyticsConfig) -> anyhow::Result<ReportRequest> {
        let now = match &self.as_of {
            Some(s) => parse_time("as-of", s)?,
            None => Utc::now(),
        };
        let mut request = ReportRequest::new(now);

        if let Some(m) = &self.metric {
            request = request.with_metric(m.parse::<MatrixMetric>()?);
        }

        let days = self.days.unwrap_or(config.timeline.default_range_days);
        let start = self.start.as_deref().map(|s| parse_time("start", s)).transpose()?;
        let end = self.end.as_deref().map(|s| parse_time("end", s)).transpose()?;
        let range = match (start, end) {
            (Some(s), Some(e)) => Some(TimeRange::new(s, e)?),
            (Some(s), None) => Some(TimeRange::new(s, now)?),
            (None, Some(e)) => Some(TimeRange::last_days(e, days)),
            (None, None) => self.days.map(|d| TimeRange::last_days(now, d)),
        };
        if let Some(range) = range {
            request = request.with_range(range);
        }

        let status = self
            .status
            .as_deref()
            .map(str::parse::<RunStatus>)
            .transpose()?;
        request = request.with_filter(TimelineFilter {
            playbook_id: self.playbook_id.clone(),
            status,
        });

        if let Some(limit) = self.limit {
            request = request.with_insight_limit(limit);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn days_without_bounds_ends_at_as_of() {
        let args = ViewArgs {
            days: Some(7),
            as_of: Some("2026-06-01T00:00:00Z".into()),
            ..ViewArgs::default()
        };
        let req = args.to_request(&AnalyticsConfig::default()).unwrap();
        let range = req.range.unwrap();
        assert_eq!(range.duration(), Duration::days(7));
        assert_eq!(range.end, req.now);
    }

    #[test]
    fn no_flags_leaves_range_to_config() {
        let req = ViewArgs::default()
            .to_request(&AnalyticsConfig::default())
            .unwrap();
        assert!(req.range.is_none());
        assert_eq!(req.metric, MatrixMetric::ResponseRate);
    }

    #[test]
    fn rejects_bad_input() {
        let cfg = AnalyticsConfig::default();
        let bad_time = ViewArgs {
            start: Some("last tuesday".into()),
            ..ViewArgs::default()
        };
        assert!(bad_time.to_request(&cfg).is_err());
        let bad_metric = ViewArgs {
            metric: Some("ctr".into()),
            ..ViewArgs::default()
        };
        assert!(bad_metric.to_request(&cfg).is_err());
    }
}
