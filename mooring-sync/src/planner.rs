//! [`ClusterApi`] adapter that plans before it registers.
//!
//! `PlanningCluster` owns the ownership-tagging convention, namespace
//! handling and the plan → carry-over → decide → register sequence. The
//! orchestrator itself sits behind [`JobBackend`], so the same adapter
//! drives the in-memory backend and any real client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, trace};

use mooring_core::error::CoreError;
use mooring_core::ports::ClusterApi;
use mooring_core::types::{ClusterState, GitInfo, JobInfo, JobSpec, Source, UpdateJobInfo};

use crate::decide::{assess, carry_autoscaler_values, decide, UpdatePolicy};
use crate::differ::diff_jobs;

// ---------------------------------------------------------------------------
// Ownership metadata
// ---------------------------------------------------------------------------

/// Marks a job as managed by mooring.
pub const META_OWNED: &str = "mooring";
pub const META_SRC_ID: &str = "mooringsrcid";
pub const META_SRC_URL: &str = "mooringsrcurl";
/// Commit the job was last registered from; changes every revision.
pub const META_SRC_COMMIT: &str = "mooringsrccommit";
/// Timestamp stamped when a restart is forced.
pub const META_FORCE_RESTART: &str = "mooringforcerestart";

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_REGION: &str = "global";

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Where a request is addressed. Source overrides win over job values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub namespace: String,
    pub region: String,
}

impl Target {
    /// Explicit namespace/region, if any was configured on the job or source.
    pub fn explicit(source: &Source, job: &JobSpec) -> (Option<String>, Option<String>) {
        let pick = |src: &str, job: &Option<String>| {
            if !src.is_empty() {
                Some(src.to_owned())
            } else {
                job.clone().filter(|j| !j.is_empty())
            }
        };
        (pick(&source.namespace, &job.namespace), pick(&source.region, &job.region))
    }

    pub fn resolve(source: &Source, job: &JobSpec) -> Self {
        let (namespace, region) = Self::explicit(source, job);
        Self {
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
            region: region.unwrap_or_else(|| DEFAULT_REGION.to_owned()),
        }
    }
}

/// Raw orchestrator operations.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Every job in every namespace the client can see.
    async fn list_jobs(&self) -> Result<Vec<JobSpec>, CoreError>;

    async fn job(&self, target: &Target, name: &str) -> Result<Option<JobSpec>, CoreError>;

    async fn register_job(&self, target: &Target, job: &JobSpec) -> Result<(), CoreError>;

    async fn deregister_job(&self, target: &Target, name: &str) -> Result<(), CoreError>;

    /// Status of the most recent deployment; `None` when the job never deployed.
    async fn latest_deployment(&self, target: &Target, job_id: &str) -> Result<Option<String>, CoreError>;

    /// Create `namespace` if it does not exist yet.
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// PlanningCluster
// ---------------------------------------------------------------------------

pub struct PlanningCluster<B: ?Sized> {
    backend: Arc<B>,
}

impl<B: JobBackend + ?Sized> PlanningCluster<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

/// Claim `job` for `source`: ownership tags, commit stamp, optional restart stamp.
pub fn stamp_ownership(source: &Source, job: &mut JobInfo, restart: bool) {
    let meta = &mut job.job.meta;
    meta.insert(META_OWNED.to_owned(), "true".to_owned());
    meta.insert(META_SRC_ID.to_owned(), source.id.0.clone());
    meta.insert(META_SRC_URL.to_owned(), source.url.clone());
    meta.insert(META_SRC_COMMIT.to_owned(), job.git_info.git_commit.clone());
    if restart {
        meta.insert(
            META_FORCE_RESTART.to_owned(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
    }
}

#[async_trait]
impl<B: JobBackend + ?Sized> ClusterApi for PlanningCluster<B> {
    async fn get_current_cluster_state(&self, source: &Source) -> Result<ClusterState, CoreError> {
        let mut state = ClusterState::default();
        for job in self.backend.list_jobs().await? {
            if job.meta.get(META_SRC_ID) != Some(&source.id.0) {
                continue;
            }
            let git_info = GitInfo {
                git_commit: job.meta.get(META_SRC_COMMIT).cloned().unwrap_or_default(),
            };
            state
                .current_jobs
                .insert(job.name.clone(), JobInfo { git_info, job });
        }
        Ok(state)
    }

    async fn update_job(
        &self,
        source: &Source,
        job: &mut JobInfo,
        restart: bool,
    ) -> Result<UpdateJobInfo, CoreError> {
        let (namespace, _) = Target::explicit(source, &job.job);
        if source.create_namespace {
            let Some(namespace) = namespace else {
                return Err(CoreError::InvalidSource {
                    id: source.id.0.clone(),
                    reason: "a namespace is required together with create_namespace".into(),
                });
            };
            self.backend.ensure_namespace(&namespace).await?;
        }

        stamp_ownership(source, job, restart);
        let target = Target::resolve(source, &job.job);
        job.job.namespace = Some(target.namespace.clone());
        job.job.region = Some(target.region.clone());
        if job.job.id.is_empty() {
            job.job.id = job.job.name.clone();
        }

        let live = self.backend.job(&target, &job.job.name).await?;
        let diff = diff_jobs(live.as_ref(), &job.job);
        carry_autoscaler_values(&mut job.job, &diff);

        let deployment_status = self
            .backend
            .latest_deployment(&target, &job.job.id)
            .await?
            .unwrap_or_default();

        let assessment = assess(&job.job, &diff);
        let policy = UpdatePolicy {
            force: source.force,
            restart,
        };
        if !decide(&assessment, policy) {
            trace!(job = %job.job.name, changed = assessment.changed, "job is already up to date");
            return Ok(UpdateJobInfo {
                deployment_status,
                ..UpdateJobInfo::default()
            });
        }
        debug!(job = %job.job.name, reasons = ?assessment.reasons, "job needs an update");

        if !source.paused {
            self.backend.register_job(&target, &job.job).await?;
            info!(job = %job.job.name, namespace = %target.namespace, "registered job");
        }

        let created = live.is_none();
        Ok(UpdateJobInfo {
            created,
            updated: !created,
            deployment_status,
            diff: serde_json::to_string(&diff).ok(),
        })
    }

    async fn delete_job(&self, source: &Source, job: &JobInfo) -> Result<(), CoreError> {
        let target = Target::resolve(source, &job.job);
        self.backend.deregister_job(&target, &job.job.name).await
    }
}
