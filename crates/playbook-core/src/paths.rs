use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLAYBOOK_DIR: &str = ".playbook";
pub const CONFIG_FILE: &str = ".playbook/config.yaml";
pub const SNAPSHOT_FILE: &str = ".playbook/snapshot.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn playbook_dir(root: &Path) -> PathBuf {
    root.join(PLAYBOOK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn snapshot_path(root: &Path) -> PathBuf {
    root.join(SNAPSHOT_FILE)
}
