use anyhow::Context;
use playbook_core::{config::AnalyticsConfig, io, paths};
use std::path::Path;

pub fn run(root: &Path, base_url: Option<&str>) -> anyhow::Result<()> {
    io::ensure_dir(&paths::playbook_dir(root)).context("failed to create .playbook/")?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("Config already present: {}", paths::CONFIG_FILE);
    } else {
        let mut config = AnalyticsConfig::default();
        if let Some(url) = base_url {
            config.api.base_url = url.to_string();
        }
        config.save(root).context("failed to write config")?;
        println!("Created {}", paths::CONFIG_FILE);
    }

    io::ensure_gitignore_entry(root, paths::SNAPSHOT_FILE)
        .context("failed to update .gitignore")?;

    println!("Initialized playbook analytics in {}", root.display());
    println!("Next: playbook fetch");
    Ok(())
}
