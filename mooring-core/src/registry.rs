//! File-backed source registry and vault-token store.
//!
//! # API pattern
//!
//! Every function takes an explicit `home: &Path`; the daemon resolves it
//! once through [`crate::paths::home`]. Tests always pass a `TempDir`.
//!
//! Writes go to a `.tmp` sibling, get `chmod 0600`, then `rename` over the
//! target so readers never observe a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{io_err, CoreError};
use crate::paths::{sources_dir_at, tokens_path_at};
use crate::ports::{SourceRepo, VaultTokenRepo};
use crate::types::{Source, SourceId};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.mooring/sources/<id>.yaml` (pure, no I/O).
pub fn source_path_at(home: &Path, id: &SourceId) -> PathBuf {
    sources_dir_at(home).join(format!("{}.yaml", id.0))
}

/// Source ids double as file names.
pub fn validate_source_id(id: &SourceId) -> Result<(), CoreError> {
    let ok = !id.0.is_empty()
        && id.0 != "."
        && id.0 != ".."
        && id
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidSource {
            id: id.0.clone(),
            reason: "id may only contain ASCII letters, digits, '-', '_' and '.'".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load one source. `CoreError::NotFound` if absent, `CoreError::Parse` if malformed.
pub fn load_source_at(home: &Path, id: &SourceId) -> Result<Source, CoreError> {
    let path = source_path_at(home, id);
    if !path.exists() {
        return Err(CoreError::NotFound(format!("source {id}")));
    }
    read_source(&path)
}

/// All registered sources, sorted by id.
pub fn list_sources_at(home: &Path) -> Result<Vec<Source>, CoreError> {
    let dir = sources_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".yaml"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    entries.iter().map(|e| read_source(&e.path())).collect()
}

fn read_source(path: &Path) -> Result<Source, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// 3. Save / remove
// ---------------------------------------------------------------------------

/// Atomically write `source` to its registry file, replacing any previous version.
pub fn save_source_at(home: &Path, source: &Source) -> Result<(), CoreError> {
    validate_source_id(&source.id)?;
    let dir = sources_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = source_path_at(home, &source.id);
    let yaml = serde_yaml::to_string(source)?;
    write_atomic(&path, yaml.as_bytes())
}

/// Remove a source file. Returns `false` when nothing was registered.
pub fn remove_source_at(home: &Path, id: &SourceId) -> Result<bool, CoreError> {
    let path = source_path_at(home, id);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// 4. Vault tokens
// ---------------------------------------------------------------------------

/// Token id to token value, as stored in `vault-tokens.yaml`.
pub fn load_tokens_at(home: &Path) -> Result<BTreeMap<String, String>, CoreError> {
    let path = tokens_path_at(home);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

pub fn save_tokens_at(home: &Path, tokens: &BTreeMap<String, String>) -> Result<(), CoreError> {
    let path = tokens_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let yaml = serde_yaml::to_string(tokens)?;
    write_atomic(&path, yaml.as_bytes())
}

// ---------------------------------------------------------------------------
// 5. Port adapters
// ---------------------------------------------------------------------------

/// [`SourceRepo`] over the `sources/` directory.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    home: PathBuf,
}

impl SourceRegistry {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[async_trait]
impl SourceRepo for SourceRegistry {
    async fn list_sources(&self) -> Result<Vec<Source>, CoreError> {
        list_sources_at(&self.home)
    }
}

/// [`VaultTokenRepo`] over `vault-tokens.yaml`, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct TokenStore {
    home: PathBuf,
}

impl TokenStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[async_trait]
impl VaultTokenRepo for TokenStore {
    async fn get_vault_token(&self, id: &str) -> Result<String, CoreError> {
        load_tokens_at(&self.home)?
            .remove(id)
            .ok_or_else(|| CoreError::NotFound(format!("vault token {id}")))
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
