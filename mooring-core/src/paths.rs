//! Filesystem layout shared by the daemon, the CLI and the stores.
//!
//! ```text
//! <home>/.mooring/
//!   sources/<id>.yaml     (one file per source, mode 0600)
//!   status/<id>.json      (last published status)
//!   events.jsonl          (append-only audit trail)
//!   vault-tokens.yaml     (token id -> value, mode 0600)
//!   repos/                (default checkout root)
//! ```

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "MOORING_HOME";

/// Home directory: `$MOORING_HOME`, else `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, CoreError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

/// `<home>/.mooring`
pub fn mooring_dir_at(home: &Path) -> PathBuf {
    home.join(".mooring")
}

/// `<home>/.mooring/sources`
pub fn sources_dir_at(home: &Path) -> PathBuf {
    mooring_dir_at(home).join("sources")
}

/// `<home>/.mooring/status`
pub fn status_dir_at(home: &Path) -> PathBuf {
    mooring_dir_at(home).join("status")
}

/// `<home>/.mooring/events.jsonl`
pub fn events_path_at(home: &Path) -> PathBuf {
    mooring_dir_at(home).join("events.jsonl")
}

/// `<home>/.mooring/vault-tokens.yaml`
pub fn tokens_path_at(home: &Path) -> PathBuf {
    mooring_dir_at(home).join("vault-tokens.yaml")
}

/// `<home>/.mooring/repos`
pub fn repos_dir_at(home: &Path) -> PathBuf {
    mooring_dir_at(home).join("repos")
}
