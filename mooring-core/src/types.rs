//! Domain types for mooring.
//!
//! All types are serializable via serde; sources live in YAML, statuses and
//! events in JSON, job specs in either.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable registry key of a watched source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A repository path on a branch, deployed into a namespace/region.
///
/// Treated as an immutable value for the duration of one reconciliation
/// pass; a live update replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub branch: String,
    /// Path of the job files inside the repository.
    pub path: String,
    /// Comma-separated datacenter override. Empty means "use the job's".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_center: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default)]
    pub paused: bool,
    /// Apply every desired job whenever any difference exists.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub create_namespace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_token_id: Option<String>,
}

impl Source {
    /// Minimal source with every override left empty.
    pub fn new(
        id: impl Into<SourceId>,
        url: impl Into<String>,
        branch: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.0.clone(),
            id,
            url: url.into(),
            branch: branch.into(),
            path: path.into(),
            data_center: String::new(),
            namespace: String::new(),
            region: String::new(),
            paused: false,
            force: false,
            create_namespace: false,
            deploy_key_id: None,
            vault_token_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Provenance of a desired state, typically the fetched commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    #[serde(default)]
    pub git_commit: String,
}

/// A workload specification as understood by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "type")]
    pub job_type: String,
    pub datacenters: Vec<String>,
    pub priority: i32,
    /// Set by the orchestrator on instances spawned from a parent job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// True for enabled periodic (cron-like) templates.
    pub periodic: bool,
    /// Live status reported by the orchestrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_token: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub task_groups: Vec<TaskGroup>,
}

impl JobSpec {
    pub fn group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|g| g.name == name)
    }

    /// True when horizontal autoscaling is enabled on the named group.
    pub fn has_group_scaling(&self, group: &str) -> bool {
        self.group(group)
            .and_then(|g| g.scaling.as_ref())
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    /// True when the named task carries a scaling policy of `kind`.
    pub fn has_task_scaling(&self, group: &str, task: &str, kind: ScalingKind) -> bool {
        self.group(group)
            .and_then(|g| g.task(task))
            .map(|t| t.scaling_policies.iter().any(|p| p.kind == kind))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGroup {
    pub name: String,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling: Option<GroupScaling>,
    pub services: Vec<Service>,
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Horizontal scaling block of a task group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupScaling {
    pub enabled: bool,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub name: String,
    pub port_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub name: String,
    pub driver: String,
    pub resources: Resources,
    pub scaling_policies: Vec<ScalingPolicy>,
    pub config: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub cpu: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub kind: ScalingKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Which quantity an autoscaler policy owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingKind {
    Horizontal,
    VerticalCpu,
    VerticalMem,
}

impl fmt::Display for ScalingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingKind::Horizontal => write!(f, "horizontal"),
            ScalingKind::VerticalCpu => write!(f, "vertical_cpu"),
            ScalingKind::VerticalMem => write!(f, "vertical_mem"),
        }
    }
}

/// A job together with the revision it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(default)]
    pub git_info: GitInfo,
    pub job: JobSpec,
}

impl JobInfo {
    pub fn name(&self) -> &str {
        &self.job.name
    }
}

/// Everything a source wants running, keyed by job name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub git_info: GitInfo,
    pub jobs: BTreeMap<String, JobInfo>,
}

/// Jobs currently running in the cluster that carry the source's ownership tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterState {
    pub current_jobs: BTreeMap<String, JobInfo>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeInfo {
    /// True when the pass ran against a paused source and applied nothing.
    pub dry_run: bool,
    pub create: BTreeMap<String, JobInfo>,
    pub update: BTreeMap<String, JobInfo>,
    pub delete: BTreeMap<String, JobInfo>,
}

impl ChangeInfo {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Result of handing one desired job to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateJobInfo {
    pub created: bool,
    pub updated: bool,
    pub deployment_status: String,
    /// JSON rendering of the structural diff when an update was decided.
    pub diff: Option<String>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Init,
    Syncing,
    Synced,
    SyncedWithError,
    Error,
    Paused,
    OutOfSync,
    Unknown,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Init => "init",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::SyncedWithError => "syncedwitherror",
            SyncStatus::Error => "error",
            SyncStatus::Paused => "paused",
            SyncStatus::OutOfSync => "outofsync",
            SyncStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Last observed state of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub status: SyncStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub jobs: BTreeMap<String, JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl SourceStatus {
    pub fn new(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Fold per-job deployment states into the overall status.
    ///
    /// A failed deployment downgrades the status to `syncedwitherror`; a
    /// running one only rewrites the message. Returns whether any
    /// deployment is still pending.
    pub fn determine_sync_status(&mut self) -> bool {
        let mut pending = false;
        let mut message = None;
        for (name, job) in &self.jobs {
            match job.deployment_status.as_str() {
                "running" => {
                    pending = true;
                    if message.is_none() {
                        message = Some(format!("Deployment pending for job: {name}"));
                    }
                }
                "failed" => {
                    self.status = SyncStatus::SyncedWithError;
                    message = Some(format!("Deployment failed for job: {name}"));
                }
                _ => {}
            }
        }
        if let Some(message) = message {
            self.message = message;
        }
        pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStatus {
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub status_description: String,
    pub deployment_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub groups: BTreeMap<String, GroupStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupStatus {
    pub count: u32,
    pub services: BTreeMap<String, ServiceStatus>,
    pub tasks: BTreeMap<String, TaskStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub driver: String,
}

// ---------------------------------------------------------------------------
// Events and notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// Audit record of one applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub message: String,
    pub source_id: SourceId,
}

impl Event {
    pub fn new(kind: EventKind, source_id: SourceId, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            source_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyInfo {
    pub header: String,
    pub text: String,
    /// Rendered as a wide block by notifiers that lay infos out in columns.
    #[serde(default)]
    pub large: bool,
}

impl NotifyInfo {
    pub fn new(header: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            text: text.into(),
            large: false,
        }
    }

    pub fn large(header: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            large: true,
            ..Self::new(header, text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOptions {
    pub source_id: SourceId,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub git_info: GitInfo,
    #[serde(default)]
    pub infos: Vec<NotifyInfo>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
