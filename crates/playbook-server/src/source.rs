use std::path::{Path, PathBuf};

use playbook_core::config::AnalyticsConfig;
use playbook_core::paths;
use playbook_core::snapshot::TelemetrySnapshot;

use crate::client::{FetchError, PlaybookApiClient};

/// Where run records come from.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    /// The live playbook API.
    Remote(PlaybookApiClient),
    /// A snapshot file written by `playbook fetch`.
    File(PathBuf),
}

impl SnapshotSource {
    /// The live API, or the workspace snapshot file when `offline`.
    pub fn from_config(
        root: &Path,
        config: &AnalyticsConfig,
        offline: bool,
    ) -> Result<Self, FetchError> {
        if offline {
            Ok(SnapshotSource::File(paths::snapshot_path(root)))
        } else {
            Ok(SnapshotSource::Remote(PlaybookApiClient::new(&config.api)?))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SnapshotSource::Remote(client) => client.base_url().to_string(),
            SnapshotSource::File(path) => path.display().to_string(),
        }
    }

    pub async fn load(&self) -> anyhow::Result<TelemetrySnapshot> {
        match self {
            SnapshotSource::Remote(client) => Ok(client.fetch_snapshot().await?),
            SnapshotSource::File(path) => {
                let path = path.clone();
                let snapshot =
                    tokio::task::spawn_blocking(move || TelemetrySnapshot::load(&path))
                        .await
                        .map_err(|e| anyhow::anyhow!("task join error: {e}"))??;
                Ok(snapshot)
            }
        }
    }
}
