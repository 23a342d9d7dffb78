use anyhow::Context;
use playbook_core::config::AnalyticsConfig;
use playbook_core::paths;
use playbook_core::repository::RunRepository;
use playbook_server::client::PlaybookApiClient;
use std::path::Path;

use crate::output::{pct, print_json};

/// Fetch every playbook and its runs and store them as the workspace snapshot.
///
/// With `summary`, print the collaborator's own summary instead and leave the
/// snapshot untouched.
pub fn run(root: &Path, summary: bool, json: bool) -> anyhow::Result<()> {
    let config = AnalyticsConfig::load(root).context("failed to load config")?;
    let client = PlaybookApiClient::new(&config.api)?;
    let rt = tokio::runtime::Runtime::new()?;

    if summary {
        let remote = rt
            .block_on(client.summary())
            .with_context(|| format!("failed to fetch summary from {}", client.base_url()))?;
        if json {
            return print_json(&remote);
        }
        println!(
            "{} playbooks ({} active), {} leads, {} response rate, {} meetings",
            remote.total_playbooks,
            remote.active_playbooks,
            remote.total_leads_targeted,
            pct(remote.response_rate),
            remote.total_meetings
        );
        return Ok(());
    }

    let snapshot = rt
        .block_on(client.fetch_snapshot())
        .with_context(|| format!("failed to fetch telemetry from {}", client.base_url()))?;
    let path = paths::snapshot_path(root);
    snapshot
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    let repo = RunRepository::from_snapshot(&snapshot);
    let quality = repo.quality_report();

    if json {
        return print_json(&serde_json::json!({
            "playbooks": snapshot.playbooks.len(),
            "runs": snapshot.runs.len(),
            "quality_issues": quality.entries.len(),
            "fetched_at": snapshot.fetched_at,
            "path": path,
        }));
    }
    println!(
        "Fetched {} playbooks and {} runs into {}",
        snapshot.playbooks.len(),
        snapshot.runs.len(),
        paths::SNAPSHOT_FILE
    );
    if !quality.is_clean() {
        println!("Data quality: {} (see 'playbook quality')", quality.summarize());
    }
    Ok(())
}
