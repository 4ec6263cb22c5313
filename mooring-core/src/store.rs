//! Status and event persistence.
//!
//! Statuses are one JSON document per source, replaced atomically on every
//! publish. Events are appended as JSON lines and never rewritten.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{io_err, CoreError};
use crate::paths::{events_path_at, status_dir_at};
use crate::ports::{EventRepo, SourceStatusPatcher};
use crate::registry::write_atomic;
use crate::types::{Event, SourceId, SourceStatus};

/// `<home>/.mooring/status/<id>.json`
pub fn status_path_at(home: &Path, id: &SourceId) -> PathBuf {
    status_dir_at(home).join(format!("{}.json", id.0))
}

pub fn save_status_at(home: &Path, id: &SourceId, status: &SourceStatus) -> Result<(), CoreError> {
    let dir = status_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let json = serde_json::to_vec_pretty(status)?;
    write_atomic(&status_path_at(home, id), &json)
}

/// Last published status, or `None` if the source never published one.
pub fn load_status_at(home: &Path, id: &SourceId) -> Result<Option<SourceStatus>, CoreError> {
    let path = status_path_at(home, id);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Every stored status, sorted by source id.
pub fn list_statuses_at(home: &Path) -> Result<Vec<(SourceId, SourceStatus)>, CoreError> {
    let dir = status_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        out.push((SourceId::from(stem), serde_json::from_str(&contents)?));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Append one event as a JSON line.
pub fn append_event_at(home: &Path, event: &Event) -> Result<(), CoreError> {
    let path = events_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    file.write_all(&line).map_err(|e| io_err(&path, e))
}

/// All events in append order. Blank lines are skipped.
pub fn read_events_at(home: &Path) -> Result<Vec<Event>, CoreError> {
    let path = events_path_at(home);
    if !path.exists() {
        return Ok(vec![]);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(CoreError::from))
        .collect()
}

/// [`SourceStatusPatcher`] over the `status/` directory.
#[derive(Debug, Clone)]
pub struct StatusStore {
    home: PathBuf,
}

impl StatusStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[async_trait]
impl SourceStatusPatcher for StatusStore {
    async fn set_source_status(&self, id: &SourceId, status: &SourceStatus) -> Result<(), CoreError> {
        let home = self.home.clone();
        let id = id.clone();
        let status = status.clone();
        tokio::task::spawn_blocking(move || save_status_at(&home, &id, &status))
            .await
            .map_err(|err| CoreError::Backend(format!("status write join error: {err}")))?
    }
}

/// [`EventRepo`] over `events.jsonl`.
///
/// Appends from concurrent loops are serialized in-process.
#[derive(Debug)]
pub struct EventLog {
    home: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl EventLog {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl EventRepo for EventLog {
    async fn save_event(&self, event: &Event) -> Result<(), CoreError> {
        let home = self.home.clone();
        let lock = self.lock.clone();
        let event = event.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| CoreError::Backend("event log lock poisoned".into()))?;
            append_event_at(&home, &event)
        })
        .await
        .map_err(|err| CoreError::Backend(format!("event append join error: {err}")))?
    }
}
