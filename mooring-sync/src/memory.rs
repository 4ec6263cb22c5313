//! In-process orchestrator backend.
//!
//! Keeps jobs per namespace, deployment states and a register counter.
//! The daemon uses it when no external orchestrator is configured; tests
//! use it to observe what the planner registered and to inject failures.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use mooring_core::error::CoreError;
use mooring_core::types::JobSpec;

use crate::planner::{JobBackend, Target, DEFAULT_NAMESPACE};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    List,
    Register,
    Deregister,
}

#[derive(Debug, Default)]
struct State {
    /// (namespace, job name) -> job
    jobs: BTreeMap<(String, String), JobSpec>,
    namespaces: BTreeSet<String>,
    /// job id -> latest deployment status
    deployments: HashMap<String, String>,
    registers: usize,
    deregisters: Vec<String>,
    failures: HashMap<BackendOp, String>,
}

impl State {
    fn check(&self, op: BackendOp) -> Result<(), CoreError> {
        match self.failures.get(&op) {
            Some(msg) => Err(CoreError::Backend(msg.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut state = State::default();
        state.namespaces.insert(DEFAULT_NAMESPACE.to_owned());
        Self {
            state: Mutex::new(state),
        }
    }

    /// Place a job directly, bypassing planning (e.g. a job someone else deployed).
    pub async fn insert(&self, namespace: &str, mut job: JobSpec) {
        job.namespace = Some(namespace.to_owned());
        let mut state = self.state.lock().await;
        state.namespaces.insert(namespace.to_owned());
        state
            .jobs
            .insert((namespace.to_owned(), job.name.clone()), job);
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<JobSpec> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Modify a live job in place, as an external autoscaler would.
    pub async fn mutate(&self, namespace: &str, name: &str, f: impl FnOnce(&mut JobSpec)) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&(namespace.to_owned(), name.to_owned())) {
            f(job);
        }
    }

    pub async fn job_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.jobs.keys().map(|(_, name)| name.clone()).collect()
    }

    pub async fn set_deployment(&self, job_id: &str, status: &str) {
        let mut state = self.state.lock().await;
        state.deployments.insert(job_id.to_owned(), status.to_owned());
    }

    pub async fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().await.namespaces.contains(namespace)
    }

    pub async fn register_count(&self) -> usize {
        self.state.lock().await.registers
    }

    pub async fn deregistered(&self) -> Vec<String> {
        self.state.lock().await.deregisters.clone()
    }

    /// Make every subsequent `op` fail with `message` until [`Self::clear_failures`].
    pub async fn fail(&self, op: BackendOp, message: &str) {
        let mut state = self.state.lock().await;
        state.failures.insert(op, message.to_owned());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }
}

#[async_trait]
impl JobBackend for MemoryBackend {
    async fn list_jobs(&self) -> Result<Vec<JobSpec>, CoreError> {
        let state = self.state.lock().await;
        state.check(BackendOp::List)?;
        Ok(state.jobs.values().cloned().collect())
    }

    async fn job(&self, target: &Target, name: &str) -> Result<Option<JobSpec>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .get(&(target.namespace.clone(), name.to_owned()))
            .cloned())
    }

    async fn register_job(&self, target: &Target, job: &JobSpec) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.check(BackendOp::Register)?;
        if !state.namespaces.contains(&target.namespace) {
            return Err(CoreError::Backend(format!(
                "namespace {} does not exist",
                target.namespace
            )));
        }
        let mut stored = job.clone();
        stored.namespace = Some(target.namespace.clone());
        stored.region = Some(target.region.clone());
        state
            .jobs
            .insert((target.namespace.clone(), job.name.clone()), stored);
        state.registers += 1;
        Ok(())
    }

    async fn deregister_job(&self, target: &Target, name: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.check(BackendOp::Deregister)?;
        state
            .jobs
            .remove(&(target.namespace.clone(), name.to_owned()))
            .ok_or_else(|| CoreError::NotFound(format!("job {name}")))?;
        state.deregisters.push(name.to_owned());
        Ok(())
    }

    async fn latest_deployment(&self, _target: &Target, job_id: &str) -> Result<Option<String>, CoreError> {
        Ok(self.state.lock().await.deployments.get(job_id).cloned())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), CoreError> {
        self.state.lock().await.namespaces.insert(namespace.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(ns: &str) -> Target {
        Target {
            namespace: ns.into(),
            region: "global".into(),
        }
    }

    #[tokio::test]
    async fn register_into_unknown_namespace_fails() {
        let backend = MemoryBackend::new();
        let job = JobSpec {
            name: "api".into(),
            ..JobSpec::default()
        };
        let err = backend.register_job(&target("payments"), &job).await.unwrap_err();
        assert!(err.to_string().contains("payments"));

        backend.ensure_namespace("payments").await.expect("namespace");
        backend.register_job(&target("payments"), &job).await.expect("register");
        assert_eq!(backend.register_count().await, 1);
    }

    #[tokio::test]
    async fn deregister_missing_job_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.deregister_job(&target("default"), "ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_failures_can_be_cleared() {
        let backend = MemoryBackend::new();
        backend.fail(BackendOp::List, "boom").await;
        assert!(backend.list_jobs().await.is_err());
        backend.clear_failures().await;
        assert!(backend.list_jobs().await.expect("list").is_empty());
    }
}
