//! # mooring-sync
//!
//! Reconciliation engine: structured job diffs, the change-worthiness
//! decision, the planning cluster adapter and the per-source reconciler.
//!
//! [`Reconciler`] runs one create/update/delete pass for a source over any
//! [`mooring_core::ports::ClusterApi`]. [`PlanningCluster`] is the adapter
//! that diffs, carries autoscaler-owned values over and decides before it
//! registers anything with a [`JobBackend`].

pub mod decide;
pub mod desired;
pub mod differ;
pub mod error;
pub mod memory;
pub mod overrides;
pub mod planner;
pub mod reconciler;

pub use decide::{assess, carry_autoscaler_values, decide, has_update, Assessment, UpdatePolicy};
pub use desired::{read_job_file, DirectoryWatcher};
pub use differ::diff_jobs;
pub use error::SyncError;
pub use memory::{BackendOp, MemoryBackend};
pub use overrides::{apply_overrides, inject_vault_token};
pub use planner::{JobBackend, PlanningCluster, Target};
pub use reconciler::{Reconciler, SourceReconciler};
