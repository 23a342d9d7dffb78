use std::collections::{BTreeMap, HashMap};

use crate::error::{AnalyticsError, Result};
use crate::grid::{CellGrid, CellKey};
use crate::metrics::Counters;
use crate::playbook::Playbook;
use crate::quality::{QualityEntry, QualityIssue, QualityIssueKind, QualityReport, RecordKind};
use crate::run::PlaybookRun;
use crate::snapshot::TelemetrySnapshot;
use crate::types::{Channel, Segment};
use crate::window::TimeRange;

// ---------------------------------------------------------------------------
// RunRepository
// ---------------------------------------------------------------------------

/// Arena of playbooks and runs with id lookup.
///
/// Built once per snapshot and never mutated afterwards, so it can be shared
/// by reference across concurrent aggregations.
#[derive(Debug, Clone, Default)]
pub struct RunRepository {
    playbooks: Vec<Playbook>,
    runs: Vec<PlaybookRun>,
    playbook_index: HashMap<String, usize>,
    run_index: HashMap<String, usize>,
    runs_by_playbook: HashMap<String, Vec<usize>>,
    quality: QualityReport,
}

impl RunRepository {
    pub fn new(playbooks: Vec<Playbook>, runs: Vec<PlaybookRun>) -> Self {
        let mut repo = RunRepository::default();
        let mut repo_issues: Vec<(RecordKind, String, QualityIssue)> = Vec::new();

        for playbook in playbooks {
            match repo.playbook_index.get(&playbook.id) {
                Some(&idx) => {
                    repo_issues.push((
                        RecordKind::Playbook,
                        playbook.id.clone(),
                        QualityIssue::new(
                            QualityIssueKind::DuplicateId,
                            "later record replaced an earlier one",
                        ),
                    ));
                    repo.playbooks[idx] = playbook;
                }
                None => {
                    repo.playbook_index
                        .insert(playbook.id.clone(), repo.playbooks.len());
                    repo.playbooks.push(playbook);
                }
            }
        }

        for run in runs {
            match repo.run_index.get(&run.id) {
                Some(&idx) => {
                    repo_issues.push((
                        RecordKind::Run,
                        run.id.clone(),
                        QualityIssue::new(
                            QualityIssueKind::DuplicateId,
                            "later record replaced an earlier one",
                        ),
                    ));
                    repo.runs[idx] = run;
                }
                None => {
                    repo.run_index.insert(run.id.clone(), repo.runs.len());
                    repo.runs.push(run);
                }
            }
        }

        for (idx, run) in repo.runs.iter_mut().enumerate() {
            if repo.playbook_index.contains_key(&run.playbook_id) {
                repo.runs_by_playbook
                    .entry(run.playbook_id.clone())
                    .or_default()
                    .push(idx);
            } else {
                let issue = QualityIssue::on_field(
                    QualityIssueKind::OrphanRun,
                    "playbook_id",
                    format!("no playbook '{}'", run.playbook_id),
                );
                run.quality.push(issue);
            }
        }

        for idx in repo.overlapping_runs() {
            let run = &mut repo.runs[idx];
            run.quality.push(QualityIssue::new(
                QualityIssueKind::OverlappingRun,
                "another run of the same playbook was active at the same time",
            ));
        }

        let mut entries = Vec::new();
        for p in &repo.playbooks {
            entries.extend(p.quality.iter().map(|issue| QualityEntry {
                record_kind: RecordKind::Playbook,
                record_id: p.id.clone(),
                issue: issue.clone(),
            }));
        }
        for r in &repo.runs {
            entries.extend(r.quality.iter().map(|issue| QualityEntry {
                record_kind: RecordKind::Run,
                record_id: r.id.clone(),
                issue: issue.clone(),
            }));
        }
        entries.extend(
            repo_issues
                .into_iter()
                .map(|(record_kind, record_id, issue)| QualityEntry {
                    record_kind,
                    record_id,
                    issue,
                }),
        );
        if !entries.is_empty() {
            tracing::warn!(
                count = entries.len(),
                "telemetry snapshot contains repaired records"
            );
        }
        repo.quality = QualityReport { entries };
        repo
    }

    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        Self::new(snapshot.playbooks.clone(), snapshot.runs.clone())
    }

    pub fn playbooks(&self) -> &[Playbook] {
        &self.playbooks
    }

    pub fn runs(&self) -> &[PlaybookRun] {
        &self.runs
    }

    pub fn playbook(&self, id: &str) -> Result<&Playbook> {
        self.playbook_index
            .get(id)
            .map(|&i| &self.playbooks[i])
            .ok_or_else(|| AnalyticsError::PlaybookNotFound(id.to_string()))
    }

    pub fn run(&self, id: &str) -> Result<&PlaybookRun> {
        self.run_index
            .get(id)
            .map(|&i| &self.runs[i])
            .ok_or_else(|| AnalyticsError::RunNotFound(id.to_string()))
    }

    pub fn runs_for(&self, playbook_id: &str) -> impl Iterator<Item = &PlaybookRun> {
        self.runs_by_playbook
            .get(playbook_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.runs[i])
    }

    /// True when `id` names a playbook or appears on any run, orphans included.
    pub fn knows_playbook(&self, id: &str) -> bool {
        self.playbook_index.contains_key(id) || self.runs.iter().any(|r| r.playbook_id == id)
    }

    /// Owning playbook of a run, `None` for orphans.
    pub fn owner(&self, run: &PlaybookRun) -> Option<&Playbook> {
        self.playbook_index
            .get(&run.playbook_id)
            .map(|&i| &self.playbooks[i])
    }

    /// Runs whose start falls inside `window`, or every run when `None`.
    pub fn runs_in<'a>(&'a self, window: Option<&'a TimeRange>) -> impl Iterator<Item = &'a PlaybookRun> {
        self.runs
            .iter()
            .filter(move |r| window.map_or(true, |w| w.contains(r.started_at)))
    }

    pub fn quality_report(&self) -> &QualityReport {
        &self.quality
    }

    /// Segment×channel counters for runs inside `window`, attributing each
    /// run's counters to channels in proportion to its playbook's mix.
    /// Orphan runs are skipped.
    pub fn cells(&self, window: Option<&TimeRange>) -> CellGrid {
        let mut grid = CellGrid::default();
        for run in self.runs_in(window) {
            let Some(playbook) = self.owner(run) else {
                continue;
            };
            let counters = Counters::from_run(run);
            for channel in Channel::all() {
                let share = playbook.channel_share(*channel);
                if share > 0.0 {
                    grid.add_scaled(CellKey::new(playbook.segment, *channel), &counters, share);
                }
            }
        }
        grid
    }

    /// Leads targeted per segment inside `window` (orphans skipped).
    pub fn segment_leads(&self, window: Option<&TimeRange>) -> BTreeMap<Segment, f64> {
        let mut leads: BTreeMap<Segment, f64> =
            Segment::all().iter().map(|s| (*s, 0.0)).collect();
        for run in self.runs_in(window) {
            if let Some(p) = self.owner(run) {
                *leads.entry(p.segment).or_default() += run.leads_targeted as f64;
            }
        }
        leads
    }

    /// Indices of runs whose active interval overlaps another run of the
    /// same playbook.
    fn overlapping_runs(&self) -> Vec<usize> {
        let mut flagged = Vec::new();
        for indices in self.runs_by_playbook.values() {
            let mut sorted: Vec<usize> = indices.clone();
            sorted.sort_by_key(|&i| self.runs[i].started_at);

            // (index, end) of the run reaching furthest so far; None = open-ended
            let mut reach: Option<(usize, Option<chrono::DateTime<chrono::Utc>>)> = None;
            for &i in &sorted {
                let run = &self.runs[i];
                if let Some((prev, end)) = reach {
                    let overlaps = end.map_or(true, |e| run.started_at < e);
                    if overlaps {
                        if !flagged.contains(&prev) {
                            flagged.push(prev);
                        }
                        flagged.push(i);
                    }
                    let this_end = run.active_until();
                    let extends = match (end, this_end) {
                        (None, _) => false,
                        (Some(_), None) => true,
                        (Some(e), Some(t)) => t > e,
                    };
                    if extends {
                        reach = Some((i, this_end));
                    }
                } else {
                    reach = Some((i, run.active_until()));
                }
            }
        }
        flagged.sort_unstable();
        flagged.dedup();
        flagged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Goal, PlaybookStatus, RunStatus};
    use chrono::{TimeZone, Utc};

    fn playbook(id: &str, segment: Segment, mix: &[(Channel, f64)]) -> Playbook {
        Playbook {
            id: id.into(),
            name: id.into(),
            segment,
            goal: Goal::Meetings,
            channel_mix: mix.iter().copied().collect(),
            schedule_frequency: "daily".into(),
            status: PlaybookStatus::Active,
            quality: vec![],
        }
    }

    fn run(id: &str, pb: &str, status: RunStatus, start_h: u32, end_h: Option<u32>) -> PlaybookRun {
        PlaybookRun {
            id: id.into(),
            playbook_id: pb.into(),
            status,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, start_h, 0, 0).unwrap(),
            completed_at: end_h.map(|h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()),
            leads_targeted: 100,
            emails_sent: 80,
            responses: 20,
            meetings_booked: 4,
            quality: vec![],
        }
    }

    #[test]
    fn lookup_by_id() {
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![run("r1", "pb-1", RunStatus::Completed, 1, Some(2))],
        );
        assert_eq!(repo.playbook("pb-1").unwrap().segment, Segment::Startup);
        assert_eq!(repo.run("r1").unwrap().responses, 20);
        assert!(matches!(
            repo.playbook("pb-9"),
            Err(AnalyticsError::PlaybookNotFound(_))
        ));
        assert!(matches!(repo.run("r9"), Err(AnalyticsError::RunNotFound(_))));
        assert_eq!(repo.runs_for("pb-1").count(), 1);
        assert!(repo.quality_report().is_clean());
    }

    #[test]
    fn cells_attribute_by_channel_mix() {
        let repo = RunRepository::new(
            vec![
                playbook(
                    "pb-1",
                    Segment::Startup,
                    &[(Channel::Email, 75.0), (Channel::Linkedin, 25.0)],
                ),
                playbook("pb-2", Segment::Enterprise, &[(Channel::Phone, 100.0)]),
            ],
            vec![
                run("r1", "pb-1", RunStatus::Completed, 1, Some(2)),
                run("r2", "pb-2", RunStatus::Completed, 3, Some(4)),
            ],
        );
        let grid = repo.cells(None);
        let email = grid.get(CellKey::new(Segment::Startup, Channel::Email));
        let linkedin = grid.get(CellKey::new(Segment::Startup, Channel::Linkedin));
        assert_eq!(email.leads_targeted, 75.0);
        assert_eq!(linkedin.responses, 5.0);
        assert_eq!(
            grid.get(CellKey::new(Segment::Enterprise, Channel::Phone))
                .meetings,
            4.0
        );
        assert_eq!(grid.total().leads_targeted, 200.0);
    }

    #[test]
    fn cells_are_deterministic() {
        let build = || {
            RunRepository::new(
                vec![playbook(
                    "pb-1",
                    Segment::Midmarket,
                    &[(Channel::Email, 50.0), (Channel::Phone, 50.0)],
                )],
                vec![run("r1", "pb-1", RunStatus::Completed, 1, Some(2))],
            )
            .cells(None)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn orphan_runs_are_flagged_and_not_attributed() {
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![run("r1", "pb-missing", RunStatus::Completed, 1, Some(2))],
        );
        assert_eq!(repo.runs().len(), 1);
        assert!(repo.cells(None).is_empty());
        assert_eq!(repo.quality_report().count(QualityIssueKind::OrphanRun), 1);
        assert!(repo.owner(&repo.runs()[0]).is_none());
        assert!(repo.knows_playbook("pb-missing"));
        assert!(repo.knows_playbook("pb-1"));
        assert!(!repo.knows_playbook("pb-other"));
    }

    #[test]
    fn duplicate_ids_keep_last_record() {
        let mut second = run("r1", "pb-1", RunStatus::Failed, 5, Some(6));
        second.responses = 0;
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![run("r1", "pb-1", RunStatus::Completed, 1, Some(2)), second],
        );
        assert_eq!(repo.runs().len(), 1);
        assert_eq!(repo.run("r1").unwrap().status, RunStatus::Failed);
        assert_eq!(repo.quality_report().count(QualityIssueKind::DuplicateId), 1);
    }

    #[test]
    fn overlapping_runs_are_flagged() {
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![
                run("r1", "pb-1", RunStatus::Running, 1, None),
                run("r2", "pb-1", RunStatus::Running, 3, None),
                run("r3", "pb-2", RunStatus::Running, 3, None),
            ],
        );
        let report = repo.quality_report();
        assert_eq!(report.count(QualityIssueKind::OverlappingRun), 2);
        assert!(!report.for_record("r1").is_empty());
        assert!(!report.for_record("r2").is_empty());
        // both overlapping runs still count
        assert_eq!(repo.cells(None).total().leads_targeted, 200.0);
    }

    #[test]
    fn sequential_runs_do_not_overlap() {
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![
                run("r1", "pb-1", RunStatus::Completed, 1, Some(2)),
                run("r2", "pb-1", RunStatus::Completed, 2, Some(3)),
                run("r3", "pb-1", RunStatus::Running, 4, None),
            ],
        );
        assert_eq!(
            repo.quality_report().count(QualityIssueKind::OverlappingRun),
            0
        );
    }

    #[test]
    fn window_filters_runs() {
        let repo = RunRepository::new(
            vec![playbook("pb-1", Segment::Startup, &[(Channel::Email, 100.0)])],
            vec![
                run("r1", "pb-1", RunStatus::Completed, 1, Some(2)),
                run("r2", "pb-1", RunStatus::Completed, 10, Some(11)),
            ],
        );
        let window = TimeRange::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 5, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(repo.runs_in(Some(&window)).count(), 1);
        assert_eq!(repo.segment_leads(Some(&window))[&Segment::Startup], 100.0);
        assert_eq!(repo.segment_leads(None)[&Segment::Enterprise], 0.0);
    }
}
