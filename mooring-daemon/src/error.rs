use std::path::PathBuf;

use thiserror::Error;

use mooring_core::CoreError;
use mooring_sync::SyncError;

/// Error surface for the supervisor, the daemon runtime and the control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {var}: {reason}")]
    Config { var: &'static str, reason: String },

    /// A signal was addressed to a source that is not being watched.
    #[error("source not watched: {0}")]
    NotFound(String),

    #[error("watch registry lock poisoned")]
    RegistryPoisoned,

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
