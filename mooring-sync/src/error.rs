//! Error types for mooring-sync.

use thiserror::Error;

use mooring_core::CoreError;

/// All errors that can abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A collaborator failed outside any specific job (e.g. listing cluster state).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("could not update job {job} for source {source_id}: {source}")]
    Update {
        job: String,
        source_id: String,
        #[source]
        source: CoreError,
    },

    #[error("could not delete job {job} for source {source_id}: {source}")]
    Delete {
        job: String,
        source_id: String,
        #[source]
        source: CoreError,
    },
}
