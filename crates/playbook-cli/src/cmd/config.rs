use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use playbook_core::config::{AnalyticsConfig, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = AnalyticsConfig::load_or_default(root).context("failed to load config")?;
    if json {
        print_json(&config)
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = AnalyticsConfig::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
