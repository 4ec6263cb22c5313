//! Create/update/delete reconciliation for one source.
//!
//! One pass: read the jobs the source owns, delete the ones no longer
//! desired, hand every desired job to the cluster (which plans and
//! decides), then summarize what changed. Mutation failures abort the pass;
//! audit events and notifications are best-effort.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, trace};

use mooring_core::ports::{ClusterApi, EventRepo, Notifier};
use mooring_core::types::{
    ChangeInfo, DesiredState, Event, EventKind, GitInfo, GroupStatus, JobInfo, JobStatus,
    NotificationKind, NotifyInfo, NotifyOptions, ServiceStatus, Source, SourceStatus,
    SyncStatus, TaskStatus, UpdateJobInfo,
};

use crate::error::SyncError;

/// What the per-source loop calls once per cycle.
#[async_trait]
pub trait SourceReconciler: Send + Sync {
    async fn reconcile(
        &self,
        source: &Source,
        desired: DesiredState,
        restart: bool,
    ) -> Result<(SourceStatus, ChangeInfo), SyncError>;
}

pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    events: Arc<dyn EventRepo>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        events: Arc<dyn EventRepo>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cluster,
            events,
            notifier,
        }
    }

    async fn record(&self, source: &Source, kind: EventKind, message: String) {
        let event = Event::new(kind, source.id.clone(), message);
        if let Err(err) = self.events.save_event(&event).await {
            error!(source_id = %source.id, error = %err, message = %event.message, "could not store event");
        }
    }

    async fn notify_updated(&self, source: &Source, git_info: &GitInfo, job: &str, restart: bool) {
        let options = NotifyOptions {
            source_id: source.id.clone(),
            kind: NotificationKind::Success,
            message: format!("Updated Job:{job}"),
            git_info: git_info.clone(),
            infos: vec![
                NotifyInfo::new("Git-Commit", &git_info.git_commit),
                NotifyInfo::new("Git-Url", &source.url),
                NotifyInfo::new("Git-Ref", &source.branch),
                NotifyInfo::new("Git-Repo-Path", &source.path),
                NotifyInfo::new("Nomad-Namespace", &source.namespace),
                NotifyInfo::new("Nomad-Region", &source.region),
                NotifyInfo::new("Force Restart", restart.to_string()),
            ],
        };
        if let Err(err) = self.notifier.notify(&options).await {
            error!(source_id = %source.id, error = %err, "could not notify");
        }
    }
}

#[async_trait]
impl SourceReconciler for Reconciler {
    async fn reconcile(
        &self,
        source: &Source,
        desired: DesiredState,
        restart: bool,
    ) -> Result<(SourceStatus, ChangeInfo), SyncError> {
        let current = self.cluster.get_current_cluster_state(source).await?;

        let mut changed = ChangeInfo {
            dry_run: source.paused,
            ..ChangeInfo::default()
        };
        let mut status = SourceStatus {
            status: SyncStatus::Synced,
            last_check_time: Some(Utc::now()),
            ..SourceStatus::default()
        };

        // Deletion pass.
        for (name, live) in &current.current_jobs {
            if desired.jobs.contains_key(name) {
                continue;
            }
            if live.job.periodic {
                trace!(job = %name, "keeping periodic job");
                continue;
            }
            // Orchestrator-spawned instances carry a parent; anything without
            // one was not created through a desired state and is left alone.
            if live.job.parent_id.as_deref().unwrap_or_default().is_empty() {
                trace!(job = %name, "keeping job without parent reference");
                continue;
            }

            changed.delete.insert(name.clone(), live.clone());
            if source.paused {
                info!(source_id = %source.id, job = %name, "job is no longer desired, would delete");
                continue;
            }

            info!(source_id = %source.id, job = %name, "job is no longer desired, deleting");
            self.cluster
                .delete_job(source, live)
                .await
                .map_err(|e| SyncError::Delete {
                    job: name.clone(),
                    source_id: source.id.0.clone(),
                    source: e,
                })?;
            self.record(source, EventKind::Deleted, format!("Deleted Job:{name}")).await;
        }

        // Create/update pass.
        let git_info = desired.git_info.clone();
        for (name, mut job) in desired.jobs {
            let info = self
                .cluster
                .update_job(source, &mut job, restart)
                .await
                .map_err(|e| SyncError::Update {
                    job: name.clone(),
                    source_id: source.id.0.clone(),
                    source: e,
                })?;

            status
                .jobs
                .insert(name.clone(), job_status(&job, current.current_jobs.get(&name), &info));

            if !info.created && !info.updated {
                trace!(job = %name, "nothing to do");
                continue;
            }

            if info.created {
                changed.create.insert(name.clone(), job.clone());
                if source.paused {
                    info!(source_id = %source.id, job = %name, "would create job");
                } else {
                    self.record(source, EventKind::Created, format!("Created Job:{name}")).await;
                    info!(source_id = %source.id, job = %name, "created job");
                }
            }
            if info.updated {
                changed.update.insert(name.clone(), job);
                if source.paused {
                    info!(source_id = %source.id, job = %name, "would update job");
                } else {
                    self.record(source, EventKind::Updated, format!("Updated Job:{name}")).await;
                    info!(source_id = %source.id, job = %name, "updated job");
                    self.notify_updated(source, &git_info, &name, restart).await;
                }
            }
        }

        if !changed.is_empty() {
            status.last_update_time = Some(Utc::now());
            status.git_commit = Some(git_info.git_commit.clone());
            status.message = format!(
                "{} created, {} updated, {} deleted",
                changed.create.len(),
                changed.update.len(),
                changed.delete.len()
            );
        }

        Ok((status, changed))
    }
}

fn job_status(job: &JobInfo, live: Option<&JobInfo>, info: &UpdateJobInfo) -> JobStatus {
    let mut status = JobStatus {
        job_type: job.job.job_type.clone(),
        status: "unknown".to_owned(),
        deployment_status: info.deployment_status.clone(),
        namespace: job.job.namespace.clone(),
        diff: info.diff.clone(),
        ..JobStatus::default()
    };
    if let Some(live) = live {
        status.status = live.job.status.clone().unwrap_or_default();
        status.status_description = live.job.status_description.clone().unwrap_or_default();
    }
    for group in &job.job.task_groups {
        let group_status = GroupStatus {
            count: group.count,
            services: group
                .services
                .iter()
                .map(|s| {
                    (
                        s.name.clone(),
                        ServiceStatus {
                            port: s.port_label.clone(),
                        },
                    )
                })
                .collect(),
            tasks: group
                .tasks
                .iter()
                .map(|t| {
                    (
                        t.name.clone(),
                        TaskStatus {
                            driver: t.driver.clone(),
                        },
                    )
                })
                .collect(),
        };
        status.groups.insert(group.name.clone(), group_status);
    }
    status
}
