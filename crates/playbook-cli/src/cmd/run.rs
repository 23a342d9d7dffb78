use crate::cmd::view::Workspace;
use crate::output::{pct, print_json, print_table};
use clap::Subcommand;
use playbook_core::types::RunStatus;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RunSubcommand {
    /// Show one run with its rates, score and data-quality notes
    Show { id: String },

    /// List runs of a playbook, newest first
    List {
        /// Playbook id
        #[arg(long = "playbook")]
        playbook_id: String,
    },

    /// Check whether a run may move from one status to another
    Transition { from: String, to: String },
}

pub fn run(root: &Path, subcmd: RunSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RunSubcommand::Show { id } => show(root, &id, json),
        RunSubcommand::List { playbook_id } => list(root, &playbook_id, json),
        RunSubcommand::Transition { from, to } => transition(&from, &to, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let run = ws.repo.run(id)?;
    let playbook = ws.repo.owner(run);
    let score = run
        .is_completed()
        .then(|| ws.config.run_score.score(run));
    let issues = ws.repo.quality_report().for_record(id);

    if json {
        return print_json(&serde_json::json!({
            "run": run,
            "playbook": playbook.map(|p| &p.name),
            "response_rate": run.response_rate(),
            "meeting_rate": run.meeting_rate(),
            "performance_score": score,
            "quality": issues,
        }));
    }

    println!("Run:        {}", run.id);
    println!(
        "Playbook:   {}",
        playbook
            .map(|p| format!("{} ({})", p.name, p.id))
            .unwrap_or_else(|| format!("{} (unknown)", run.playbook_id))
    );
    println!("Status:     {}", run.status);
    println!("Started:    {}", run.started_at.to_rfc3339());
    if let Some(done) = run.completed_at {
        println!("Completed:  {}", done.to_rfc3339());
    }
    println!(
        "Outreach:   {} leads, {} sent, {} responses, {} meetings",
        run.leads_targeted, run.emails_sent, run.responses, run.meetings_booked
    );
    println!(
        "Rates:      response {}, meeting {}",
        pct(run.response_rate()),
        pct(run.meeting_rate())
    );
    if let Some(score) = score {
        println!("Score:      {score}");
    }
    for issue in issues {
        println!("Note:       {}: {}", issue.kind, issue.detail);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(root: &Path, playbook_id: &str, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root)?;
    let mut runs: Vec<_> = ws.repo.runs_for(playbook_id).collect();
    if runs.is_empty() && ws.repo.playbook(playbook_id).is_err() {
        anyhow::bail!("playbook not found: {playbook_id}");
    }
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    if json {
        return print_json(&runs);
    }
    let rows = runs
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.status.to_string(),
                r.started_at.format("%Y-%m-%d %H:%M").to_string(),
                r.meetings_booked.to_string(),
                pct(r.response_rate()),
            ]
        })
        .collect();
    print_table(&["RUN", "STATUS", "STARTED", "MEETINGS", "RESPONSE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

fn transition(from: &str, to: &str, json: bool) -> anyhow::Result<()> {
    let from: RunStatus = from.parse()?;
    let to: RunStatus = to.parse()?;
    from.transition(to)?;
    if json {
        return print_json(&serde_json::json!({
            "from": from,
            "to": to,
            "valid": true,
            "terminal": to.is_terminal(),
        }));
    }
    println!("{from} -> {to}: allowed");
    Ok(())
}
