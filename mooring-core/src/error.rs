//! Error types for mooring-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the stores and by every collaborator port.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON serialization/deserialization error (status store, event log).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or MOORING_HOME")]
    HomeNotFound,

    #[error("not found: {0}")]
    NotFound(String),

    /// A source record that cannot be acted upon.
    #[error("invalid source {id}: {reason}")]
    InvalidSource { id: String, reason: String },

    /// Failure reported by an external system (orchestrator, notifier, git).
    #[error("{0}")]
    Backend(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
