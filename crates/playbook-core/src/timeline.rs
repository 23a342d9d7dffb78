use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{mean, percentage};
use crate::run::PlaybookRun;
use crate::types::RunStatus;
use crate::window::TimeRange;

// ---------------------------------------------------------------------------
// RunScorePolicy
// ---------------------------------------------------------------------------

/// Weighting for a single run's performance score. Independent of the cell
/// health policy even though the defaults match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunScorePolicy {
    #[serde(default = "default_response_weight")]
    pub response_weight: f64,
    #[serde(default = "default_meeting_weight")]
    pub meeting_weight: f64,
}

fn default_response_weight() -> f64 {
    0.6
}

fn default_meeting_weight() -> f64 {
    0.4
}

impl Default for RunScorePolicy {
    fn default() -> Self {
        Self {
            response_weight: default_response_weight(),
            meeting_weight: default_meeting_weight(),
        }
    }
}

impl RunScorePolicy {
    pub fn score(&self, run: &PlaybookRun) -> u32 {
        if run.emails_sent == 0 {
            return 0;
        }
        let raw = run.response_rate() * self.response_weight
            + run.meeting_rate() * self.meeting_weight;
        if !raw.is_finite() || raw <= 0.0 {
            return 0;
        }
        raw.round() as u32
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

impl TimelineFilter {
    pub fn matches(&self, run: &PlaybookRun) -> bool {
        self.playbook_id
            .as_deref()
            .map_or(true, |id| run.playbook_id == id)
            && self.status.map_or(true, |s| run.status == s)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub run_id: String,
    pub playbook_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub position_pct: f64,
    pub duration_minutes: Option<i64>,
    pub leads_targeted: u64,
    pub meetings_booked: u64,
    pub response_rate: f64,
    pub meeting_rate: f64,
    /// Only reported for completed runs.
    pub performance_score: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub runs: usize,
    pub completed: usize,
    pub meetings: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
    pub unclassified: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: RunStatus) {
        let slot = match status {
            RunStatus::Pending => &mut self.pending,
            RunStatus::Running => &mut self.running,
            RunStatus::Completed => &mut self.completed,
            RunStatus::Failed => &mut self.failed,
            RunStatus::Paused => &mut self.paused,
            RunStatus::Unclassified => &mut self.unclassified,
        };
        *slot += 1;
    }

    pub fn get(&self, status: RunStatus) -> usize {
        match status {
            RunStatus::Pending => self.pending,
            RunStatus::Running => self.running,
            RunStatus::Completed => self.completed,
            RunStatus::Failed => self.failed,
            RunStatus::Paused => self.paused,
            RunStatus::Unclassified => self.unclassified,
        }
    }

    pub fn total(&self) -> usize {
        RunStatus::all().iter().map(|s| self.get(*s)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub total_runs: usize,
    pub status_counts: StatusCounts,
    pub success_rate: f64,
    pub avg_performance: f64,
    pub total_leads: u64,
    pub total_meetings: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub range: TimeRange,
    pub filter: TimelineFilter,
    pub entries: Vec<TimelineEntry>,
    pub buckets: Vec<TimelineBucket>,
    pub summary: TimelineSummary,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Lay runs started inside `range` on a time axis.
///
/// Any mix of statuses is accepted, including overlapping runs of the same
/// playbook; each is counted once.
pub fn aggregate<'a>(
    runs: impl IntoIterator<Item = &'a PlaybookRun>,
    range: &TimeRange,
    filter: &TimelineFilter,
    policy: &RunScorePolicy,
    bucket_count: usize,
) -> Timeline {
    let mut selected: Vec<&PlaybookRun> = runs
        .into_iter()
        .filter(|r| range.contains(r.started_at) && filter.matches(r))
        .collect();
    selected.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));

    let entries: Vec<TimelineEntry> = selected.iter().map(|r| entry(r, range, policy)).collect();
    let buckets = bucketize(&entries, range, bucket_count);
    let summary = summarize(&selected, policy);

    Timeline {
        range: *range,
        filter: filter.clone(),
        entries,
        buckets,
        summary,
    }
}

fn entry(run: &PlaybookRun, range: &TimeRange, policy: &RunScorePolicy) -> TimelineEntry {
    TimelineEntry {
        run_id: run.id.clone(),
        playbook_id: run.playbook_id.clone(),
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        position_pct: range.position_pct(run.started_at),
        duration_minutes: run
            .completed_at
            .map(|end| (end - run.started_at).num_minutes().max(0)),
        leads_targeted: run.leads_targeted,
        meetings_booked: run.meetings_booked,
        response_rate: run.response_rate(),
        meeting_rate: run.meeting_rate(),
        performance_score: run.is_completed().then(|| policy.score(run)),
    }
}

pub fn summarize(runs: &[&PlaybookRun], policy: &RunScorePolicy) -> TimelineSummary {
    let mut status_counts = StatusCounts::default();
    let mut total_leads = 0u64;
    let mut total_meetings = 0u64;
    let mut scores = Vec::new();

    for run in runs {
        status_counts.record(run.status);
        total_leads = total_leads.saturating_add(run.leads_targeted);
        total_meetings = total_meetings.saturating_add(run.meetings_booked);
        if run.is_completed() {
            scores.push(f64::from(policy.score(run)));
        }
    }

    TimelineSummary {
        total_runs: runs.len(),
        success_rate: percentage(status_counts.completed as f64, runs.len() as f64),
        avg_performance: mean(&scores),
        status_counts,
        total_leads,
        total_meetings,
    }
}

fn bucketize(entries: &[TimelineEntry], range: &TimeRange, bucket_count: usize) -> Vec<TimelineBucket> {
    let n = bucket_count.max(1);
    let span_ms = range.duration().num_milliseconds().max(0);
    let width_ms = span_ms / n as i64;

    let mut buckets: Vec<TimelineBucket> = (0..n)
        .map(|i| {
            let start = range.start + Duration::milliseconds(width_ms * i as i64);
            let end = if i + 1 == n {
                range.end
            } else {
                range.start + Duration::milliseconds(width_ms * (i as i64 + 1))
            };
            TimelineBucket {
                start,
                end,
                runs: 0,
                completed: 0,
                meetings: 0,
            }
        })
        .collect();

    for e in entries {
        let offset_ms = (e.started_at - range.start).num_milliseconds().max(0);
        let idx = if span_ms > 0 {
            ((i128::from(offset_ms) * n as i128 / i128::from(span_ms)) as usize).min(n - 1)
        } else {
            0
        };
        let bucket = &mut buckets[idx];
        bucket.runs += 1;
        if e.status == RunStatus::Completed {
            bucket.completed += 1;
        }
        bucket.meetings = bucket.meetings.saturating_add(e.meetings_booked);
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 0, 0, 0).unwrap()
    }

    fn run(id: &str, playbook: &str, status: RunStatus, started: DateTime<Utc>) -> PlaybookRun {
        PlaybookRun {
            id: id.into(),
            playbook_id: playbook.into(),
            status,
            started_at: started,
            completed_at: None,
            leads_targeted: 120,
            emails_sent: 100,
            responses: 20,
            meetings_booked: 5,
            quality: vec![],
        }
    }

    fn range() -> TimeRange {
        TimeRange::new(day(1), day(8)).unwrap()
    }

    #[test]
    fn performance_score_example() {
        let r = run("r1", "p", RunStatus::Completed, day(2));
        assert_eq!(r.response_rate(), 20.0);
        assert_eq!(r.meeting_rate(), 25.0);
        assert_eq!(RunScorePolicy::default().score(&r), 22);
    }

    #[test]
    fn zero_sent_scores_zero() {
        let mut r = run("r1", "p", RunStatus::Completed, day(2));
        r.emails_sent = 0;
        r.responses = 5;
        r.meetings_booked = 5;
        assert_eq!(RunScorePolicy::default().score(&r), 0);
    }

    #[test]
    fn score_only_for_completed_runs() {
        let runs = vec![
            run("a", "p", RunStatus::Completed, day(2)),
            run("b", "p", RunStatus::Running, day(3)),
        ];
        let t = aggregate(&runs, &range(), &TimelineFilter::default(), &RunScorePolicy::default(), 7);
        assert_eq!(t.entries[0].performance_score, Some(22));
        assert_eq!(t.entries[1].performance_score, None);
        assert_eq!(t.summary.avg_performance, 22.0);
        assert_eq!(t.summary.success_rate, 50.0);
    }

    #[test]
    fn summary_totals_saturate() {
        let mut a = run("a", "p", RunStatus::Completed, day(2));
        a.leads_targeted = u64::MAX;
        a.meetings_booked = u64::MAX;
        let b = run("b", "p", RunStatus::Completed, day(3));
        let t = aggregate(&[a, b], &range(), &TimelineFilter::default(), &RunScorePolicy::default(), 1);
        assert_eq!(t.summary.total_leads, u64::MAX);
        assert_eq!(t.summary.total_meetings, u64::MAX);
        assert_eq!(t.buckets[0].meetings, u64::MAX);
    }

    #[test]
    fn success_rate_extremes() {
        let policy = RunScorePolicy::default();
        let all_done = vec![
            run("a", "p", RunStatus::Completed, day(2)),
            run("b", "p", RunStatus::Completed, day(3)),
        ];
        let t = aggregate(&all_done, &range(), &TimelineFilter::default(), &policy, 7);
        assert_eq!(t.summary.success_rate, 100.0);

        let none_done = vec![
            run("a", "p", RunStatus::Failed, day(2)),
            run("b", "p", RunStatus::Unclassified, day(3)),
        ];
        let t = aggregate(&none_done, &range(), &TimelineFilter::default(), &policy, 7);
        assert_eq!(t.summary.success_rate, 0.0);
        assert_eq!(t.summary.avg_performance, 0.0);
        assert_eq!(t.summary.status_counts.unclassified, 1);

        let t = aggregate(&Vec::<PlaybookRun>::new(), &range(), &TimelineFilter::default(), &policy, 7);
        assert_eq!(t.summary.success_rate, 0.0);
        assert_eq!(t.summary.total_runs, 0);
    }

    #[test]
    fn filters_by_window_playbook_and_status() {
        let runs = vec![
            run("a", "p1", RunStatus::Completed, day(1)),
            run("b", "p2", RunStatus::Completed, day(4)),
            run("c", "p1", RunStatus::Failed, day(8)),
            run("d", "p1", RunStatus::Completed, day(20)),
        ];
        let policy = RunScorePolicy::default();
        let all = aggregate(&runs, &range(), &TimelineFilter::default(), &policy, 7);
        assert_eq!(all.summary.total_runs, 3);
        assert_eq!(all.summary.total_leads, 360);
        assert_eq!(all.summary.total_meetings, 15);

        let filter = TimelineFilter {
            playbook_id: Some("p1".into()),
            status: Some(RunStatus::Completed),
        };
        let one = aggregate(&runs, &range(), &filter, &policy, 7);
        assert_eq!(one.entries.len(), 1);
        assert_eq!(one.entries[0].run_id, "a");
    }

    #[test]
    fn positions_and_buckets() {
        let runs = vec![
            run("a", "p", RunStatus::Completed, day(1)),
            run("b", "p", RunStatus::Running, day(4)),
            run("c", "p", RunStatus::Completed, day(8)),
        ];
        let t = aggregate(&runs, &range(), &TimelineFilter::default(), &RunScorePolicy::default(), 7);
        assert_eq!(t.entries[0].position_pct, 0.0);
        assert!((t.entries[1].position_pct - 300.0 / 7.0).abs() < 1e-9);
        assert_eq!(t.entries[2].position_pct, 100.0);

        assert_eq!(t.buckets.len(), 7);
        assert_eq!(t.buckets[0].runs, 1);
        assert_eq!(t.buckets[3].runs, 1);
        assert_eq!(t.buckets[6].runs, 1);
        assert_eq!(t.buckets[6].completed, 1);
        assert_eq!(t.buckets[6].end, day(8));
        let total: usize = t.buckets.iter().map(|b| b.runs).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn zero_length_window_puts_everything_first() {
        let point = TimeRange::new(day(3), day(3)).unwrap();
        let runs = vec![run("a", "p", RunStatus::Completed, day(3))];
        let t = aggregate(&runs, &point, &TimelineFilter::default(), &RunScorePolicy::default(), 4);
        assert_eq!(t.entries[0].position_pct, 0.0);
        assert_eq!(t.buckets[0].runs, 1);
    }

    #[test]
    fn overlapping_runs_are_both_counted() {
        let mut a = run("a", "p", RunStatus::Completed, day(2));
        a.completed_at = Some(day(5));
        let b = run("b", "p", RunStatus::Running, day(3));
        let t = aggregate([&a, &b], &range(), &TimelineFilter::default(), &RunScorePolicy::default(), 7);
        assert_eq!(t.summary.total_runs, 2);
        assert_eq!(t.entries[0].duration_minutes, Some(3 * 24 * 60));
    }
}
