use std::path::{Path, PathBuf};

use playbook_core::paths::PLAYBOOK_DIR;

/// Resolve the workspace root.
///
/// Priority:
/// 1. `--root` flag / `PLAYBOOK_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.playbook/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_workspace(&cwd).unwrap_or(cwd)
}

/// Nearest ancestor of `start` (inclusive) holding a `.playbook/` directory.
fn find_workspace(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PLAYBOOK_DIR).is_dir())
        .map(Path::to_path_buf)
}
