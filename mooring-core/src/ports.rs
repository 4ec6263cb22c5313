//! Collaborator contracts the reconciliation core depends on.
//!
//! Every boundary the controller talks to (desired-state fetching, the
//! orchestrator, status persistence, notifications, the audit trail and
//! the source record store) is an async trait so the daemon can wire real
//! adapters and the tests can wire recording fakes.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::{
    ClusterState, DesiredState, Event, JobInfo, NotifyOptions, Source, SourceId, SourceStatus,
    UpdateJobInfo,
};

/// Produces the desired job set for a source.
#[async_trait]
pub trait DesiredStateWatcher: Send + Sync {
    async fn fetch_desired_state(&self, source: &Source) -> Result<DesiredState, CoreError>;
}

/// Reads and mutates the orchestrator on behalf of a source.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Jobs whose ownership metadata names `source`.
    async fn get_current_cluster_state(&self, source: &Source) -> Result<ClusterState, CoreError>;

    /// Plan, decide and (unless the source is paused) register `job`.
    ///
    /// `job` is mutated in place: ownership metadata is stamped and
    /// autoscaler-owned values are carried over from the live job.
    async fn update_job(
        &self,
        source: &Source,
        job: &mut JobInfo,
        restart: bool,
    ) -> Result<UpdateJobInfo, CoreError>;

    async fn delete_job(&self, source: &Source, job: &JobInfo) -> Result<(), CoreError>;
}

/// Best-effort status persistence.
#[async_trait]
pub trait SourceStatusPatcher: Send + Sync {
    async fn set_source_status(&self, id: &SourceId, status: &SourceStatus) -> Result<(), CoreError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, options: &NotifyOptions) -> Result<(), CoreError>;
}

/// Append-only audit trail of applied changes.
#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn save_event(&self, event: &Event) -> Result<(), CoreError>;
}

#[async_trait]
pub trait SourceRepo: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>, CoreError>;
}

/// Resolves a secret token reference to its value.
#[async_trait]
pub trait VaultTokenRepo: Send + Sync {
    async fn get_vault_token(&self, id: &str) -> Result<String, CoreError>;
}
