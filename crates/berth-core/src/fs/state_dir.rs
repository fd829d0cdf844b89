//! Per-project state directory resolution
//!
//! State lives in the user's state directory, not in the project tree:
//! - Unix: `$XDG_STATE_HOME/berth/<project_key>` or `~/.local/state/berth/<project_key>`
//! - Windows: `%LOCALAPPDATA%\berth\<project_key>`

use std::fs;
use std::path::{Path, PathBuf};

/// Root of all berth state
pub fn default_state_root() -> anyhow::Result<PathBuf> {
    let base = if cfg!(unix) {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
    } else {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
    };
    Ok(base.join("berth"))
}

/// Stable key for a project root
///
/// Moving a project directory yields a new key and therefore fresh state.
pub fn project_key(project_root: &Path) -> String {
    let path = fs::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
    blake3::hash(path.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// Default state directory for one project
pub fn project_state_dir(project_root: &Path) -> anyhow::Result<PathBuf> {
    Ok(default_state_root()?.join(project_key(project_root)))
}
