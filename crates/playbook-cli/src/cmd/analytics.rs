use std::path::Path;

use playbook_core::funnel::{FunnelResult, FunnelSnapshot};
use playbook_core::health::{self, HealthGrid};
use playbook_core::insight::Insight;
use playbook_core::matrix::{self, BenchmarkMatrix};
use playbook_core::quality::QualityReport;
use playbook_core::report::{build_report, AnalyticsSummary};
use playbook_core::timeline::{self, Timeline};

use crate::cmd::view::{ViewArgs, Workspace};
use crate::output::{number, opt_pct, pct, print_json, print_table, trend};

// ---------------------------------------------------------------------------
// report
// ---------------------------------------------------------------------------

pub fn report(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let request = args.to_request(&ws.config)?;
    let report = build_report(&ws.repo, &request, &ws.config);

    if json {
        return print_json(&report);
    }

    println!(
        "Window: {} .. {}",
        report.range.start.to_rfc3339(),
        report.range.end.to_rfc3339()
    );
    println!();
    print_summary(&report.summary);
    println!();
    println!("Funnel");
    print_funnel(&report.funnel);
    println!();
    println!(
        "Runs: {} ({} completed), success rate {}, avg score {}",
        report.timeline.summary.total_runs,
        report.timeline.summary.status_counts.completed,
        pct(report.timeline.summary.success_rate),
        number(report.timeline.summary.avg_performance),
    );
    println!("Health: average {}", number(report.health.average_score));
    if let Some(best) = report.matrix.best() {
        println!(
            "Best {}: {} / {} at {}",
            report.matrix.metric.label(),
            best.segment,
            best.channel,
            number(best.value)
        );
    }
    println!();
    println!("Insights");
    print_insights(&report.insights);
    if !report.quality.is_clean() {
        println!();
        println!("Data quality: {}", report.quality.summarize());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// funnel
// ---------------------------------------------------------------------------

pub fn funnel(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let range = args.to_request(&ws.config)?.window(&ws.config);
    let result = FunnelSnapshot::from_runs(ws.repo.runs_in(Some(&range))).aggregate();

    if json {
        return print_json(&result);
    }
    print_funnel(&result);
    Ok(())
}

fn print_funnel(result: &FunnelResult) {
    let rows = result
        .stages
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.value.to_string(),
                opt_pct(s.conversion_rate),
                s.drop_off.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["STAGE", "COUNT", "CONVERSION", "DROP-OFF"], rows);
    println!("Overall conversion: {}", opt_pct(result.overall_conversion));
    if let Some(drop) = result.biggest_drop() {
        println!("Biggest drop: {}", drop.name);
    }
}

// ---------------------------------------------------------------------------
// matrix
// ---------------------------------------------------------------------------

pub fn matrix(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let request = args.to_request(&ws.config)?;
    let range = request.window(&ws.config);
    let grid = ws.repo.cells(Some(&range));
    let prior = ws.repo.cells(Some(&range.prior()));
    let result = matrix::compute(&grid, Some(&prior), request.metric, &ws.config.matrix);

    if json {
        return print_json(&result);
    }
    print_matrix(&result);
    Ok(())
}

fn print_matrix(result: &BenchmarkMatrix) {
    let fmt = |v: f64| {
        if result.metric.is_percentage() {
            pct(v)
        } else {
            number(v)
        }
    };
    let rows = result
        .cells
        .iter()
        .map(|c| {
            vec![
                c.segment.to_string(),
                c.channel.to_string(),
                fmt(c.value),
                c.ratio.map(|r| format!("{r:.2}")).unwrap_or_else(|| "-".into()),
                trend(c.trend),
                c.tier.to_string(),
            ]
        })
        .collect();
    print_table(&["SEGMENT", "CHANNEL", "VALUE", "RATIO", "TREND", "TIER"], rows);
    println!(
        "{} benchmark: {}{}",
        result.metric.label(),
        fmt(result.benchmark),
        if result.lower_is_better { " (lower is better)" } else { "" }
    );
}

// ---------------------------------------------------------------------------
// health
// ---------------------------------------------------------------------------

pub fn health(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let range = args.to_request(&ws.config)?.window(&ws.config);
    let grid = ws.repo.cells(Some(&range));
    let prior = ws.repo.cells(Some(&range.prior()));
    let result = health::score_grid(&grid, Some(&prior), &ws.config.health);

    if json {
        return print_json(&result);
    }
    print_health(&result);
    Ok(())
}

fn print_health(result: &HealthGrid) {
    let rows = result
        .cells
        .iter()
        .map(|c| {
            vec![
                c.segment.to_string(),
                c.channel.to_string(),
                if c.has_data { c.score.to_string() } else { "-".into() },
                if c.has_data { c.tier.to_string() } else { "no data".into() },
                trend(c.trend),
            ]
        })
        .collect();
    print_table(&["SEGMENT", "CHANNEL", "SCORE", "TIER", "TREND"], rows);
    println!("Average score: {}", number(result.average_score));
    let attention = result.attention();
    if !attention.is_empty() {
        let names: Vec<String> = attention
            .iter()
            .map(|c| format!("{}/{}", c.segment, c.channel))
            .collect();
        println!("Needs attention: {}", names.join(", "));
    }
}

// ---------------------------------------------------------------------------
// timeline
// ---------------------------------------------------------------------------

pub fn timeline(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let request = args.to_request(&ws.config)?;
    if let Some(id) = &request.filter.playbook_id {
        if !ws.repo.knows_playbook(id) {
            anyhow::bail!("playbook not found: {id}");
        }
    }
    let result = timeline::aggregate(
        ws.repo.runs(),
        &request.window(&ws.config),
        &request.filter,
        &ws.config.run_score,
        ws.config.timeline.buckets,
    );

    if json {
        return print_json(&result);
    }
    print_timeline(&result);
    Ok(())
}

fn print_timeline(result: &Timeline) {
    let rows = result
        .entries
        .iter()
        .map(|e| {
            vec![
                e.run_id.clone(),
                e.playbook_id.clone(),
                e.status.to_string(),
                e.started_at.format("%Y-%m-%d %H:%M").to_string(),
                format!("{:.0}%", e.position_pct),
                e.meetings_booked.to_string(),
                e.performance_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(
        &["RUN", "PLAYBOOK", "STATUS", "STARTED", "POSITION", "MEETINGS", "SCORE"],
        rows,
    );
    let s = &result.summary;
    println!(
        "{} runs, success rate {}, avg score {}, {} leads, {} meetings",
        s.total_runs,
        pct(s.success_rate),
        number(s.avg_performance),
        s.total_leads,
        s.total_meetings
    );
}

// ---------------------------------------------------------------------------
// insights
// ---------------------------------------------------------------------------

pub fn insights(root: &Path, args: &ViewArgs, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let request = args.to_request(&ws.config)?;
    let insights = build_report(&ws.repo, &request, &ws.config).insights;

    if json {
        return print_json(&insights);
    }
    print_insights(&insights);
    Ok(())
}

fn print_insights(insights: &[Insight]) {
    let rows = insights
        .iter()
        .map(|i| {
            vec![
                i.priority.to_string(),
                i.insight_type.to_string(),
                i.impact.to_string(),
                i.title.clone(),
            ]
        })
        .collect();
    print_table(&["PRIORITY", "TYPE", "IMPACT", "TITLE"], rows);
}

// ---------------------------------------------------------------------------
// summary
// ---------------------------------------------------------------------------

pub fn summary(root: &Path, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let summary = AnalyticsSummary::from_repository(&ws.repo);

    if json {
        return print_json(&summary);
    }
    print_summary(&summary);
    if let Some(at) = ws.snapshot.fetched_at {
        println!("Fetched:          {}", at.to_rfc3339());
    }
    Ok(())
}

fn print_summary(summary: &AnalyticsSummary) {
    println!(
        "Playbooks:        {} ({} active)",
        summary.total_playbooks, summary.active_playbooks
    );
    println!("Leads targeted:   {}", summary.total_leads_targeted);
    println!("Response rate:    {}", pct(summary.response_rate));
    println!("Meetings booked:  {}", summary.total_meetings);
}

// ---------------------------------------------------------------------------
// quality
// ---------------------------------------------------------------------------

pub fn quality(root: &Path, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let report = ws.repo.quality_report();

    if json {
        return print_json(report);
    }
    print_quality(report);
    Ok(())
}

fn print_quality(report: &QualityReport) {
    if report.is_clean() {
        println!("No data-quality issues.");
        return;
    }
    let rows = report
        .entries
        .iter()
        .map(|e| {
            vec![
                e.record_id.clone(),
                e.issue.kind.to_string(),
                e.issue.field.clone().unwrap_or_else(|| "-".into()),
                e.issue.detail.clone(),
            ]
        })
        .collect();
    print_table(&["RECORD", "ISSUE", "FIELD", "DETAIL"], rows);
    println!("{}", report.summarize());
}
