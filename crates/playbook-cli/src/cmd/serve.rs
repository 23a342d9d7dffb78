use anyhow::Context;
use playbook_core::config::AnalyticsConfig;
use std::path::Path;

pub fn run(root: &Path, port: Option<u16>, offline: bool) -> anyhow::Result<()> {
    let config = AnalyticsConfig::load_or_default(root).context("failed to load config")?;
    for w in config.validate() {
        tracing::warn!(level = ?w.level, "{}", w.message);
    }
    let port = port.unwrap_or(config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(playbook_server::serve(
        root.to_path_buf(),
        config,
        offline,
        port,
    ))
}
