//! Mooring core library: domain types, plan diffs, collaborator ports,
//! file-backed stores and errors.
//!
//! - [`types`]: sources, jobs, statuses, events
//! - [`plan`]: structured diff between a live and a desired job
//! - [`ports`]: async collaborator traits
//! - [`registry`] / [`store`]: file-backed adapters for those traits

pub mod error;
pub mod giturl;
pub mod paths;
pub mod plan;
pub mod ports;
pub mod registry;
pub mod store;
pub mod types;

pub use error::CoreError;
pub use plan::{DiffType, FieldDiff, JobDiff, ObjectDiff, TaskDiff, TaskGroupDiff};
pub use types::{
    ChangeInfo, ClusterState, DesiredState, Event, EventKind, GitInfo, JobInfo, JobSpec,
    JobStatus, NotificationKind, NotifyInfo, NotifyOptions, ScalingKind, Source, SourceId,
    SourceStatus, SyncStatus, UpdateJobInfo,
};
