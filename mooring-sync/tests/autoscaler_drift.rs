use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mooring_core::error::CoreError;
use mooring_core::ports::{DesiredStateWatcher, EventRepo, Notifier};
use mooring_core::types::{Event, NotifyOptions, Source};
use mooring_sync::{DirectoryWatcher, MemoryBackend, PlanningCluster, Reconciler, SourceReconciler};
use tempfile::TempDir;

struct Discard;

#[async_trait]
impl EventRepo for Discard {
    async fn save_event(&self, _event: &Event) -> Result<(), CoreError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for Discard {
    async fn notify(&self, _options: &NotifyOptions) -> Result<(), CoreError> {
        Ok(())
    }
}

const WEB: &str = r#"
name: web
type: service
task_groups:
  - name: web
    count: 2
    scaling:
      enabled: true
      min: 1
      max: 10
    tasks:
      - name: app
        driver: docker
        resources:
          cpu: 500
          memory_mb: 256
        scaling_policies:
          - kind: vertical_cpu
"#;

const BATCH: &str = r#"
name: batch
type: batch
task_groups:
  - name: workers
    count: 3
    tasks:
      - name: run
        driver: exec
"#;

struct Harness {
    _checkout: TempDir,
    dir: std::path::PathBuf,
    source: Source,
    watcher: DirectoryWatcher,
    backend: Arc<MemoryBackend>,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        let checkout = TempDir::new().expect("checkout");
        let dir = checkout.path().join("deploy");
        fs::create_dir_all(&dir).expect("mkdir deploy");
        fs::write(dir.join("web.yaml"), WEB).expect("write web");
        fs::write(dir.join("batch.yaml"), BATCH).expect("write batch");

        let backend = Arc::new(MemoryBackend::new());
        let reconciler = Reconciler::new(
            Arc::new(PlanningCluster::new(backend.clone())),
            Arc::new(Discard),
            Arc::new(Discard),
        );
        let source = Source::new(
            "web",
            format!("file://{}", checkout.path().display()),
            "main",
            "deploy",
        );
        Self {
            watcher: DirectoryWatcher::new(checkout.path().join("repos")),
            _checkout: checkout,
            dir,
            source,
            backend,
            reconciler,
        }
    }

    fn edit(&self, file: &str, from: &str, to: &str) {
        let path: &Path = &self.dir.join(file);
        let contents = fs::read_to_string(path).expect("read job file");
        fs::write(path, contents.replace(from, to)).expect("rewrite job file");
    }

    async fn cycle(&self) -> mooring_core::ChangeInfo {
        let desired = self
            .watcher
            .fetch_desired_state(&self.source)
            .await
            .expect("fetch desired");
        let (_, changed) = self
            .reconciler
            .reconcile(&self.source, desired, false)
            .await
            .expect("reconcile");
        changed
    }
}

#[tokio::test]
async fn horizontal_autoscaler_count_is_not_drift() {
    let h = Harness::new();
    assert_eq!(h.cycle().await.create.len(), 2);

    h.backend
        .mutate("default", "web", |j| j.task_groups[0].count = 7)
        .await;
    let changed = h.cycle().await;
    assert!(changed.is_empty(), "autoscaled count left alone: {changed:?}");
    assert_eq!(h.backend.get("default", "web").await.expect("web").task_groups[0].count, 7);
}

#[tokio::test]
async fn count_drift_without_autoscaling_is_corrected() {
    let h = Harness::new();
    h.cycle().await;

    h.backend
        .mutate("default", "batch", |j| j.task_groups[0].count = 9)
        .await;
    let changed = h.cycle().await;
    assert_eq!(changed.update.keys().collect::<Vec<_>>(), vec!["batch"]);
    assert_eq!(h.backend.get("default", "batch").await.expect("batch").task_groups[0].count, 3);
}

#[tokio::test]
async fn covered_cpu_survives_an_unrelated_update() {
    let h = Harness::new();
    h.cycle().await;
    h.backend
        .mutate("default", "web", |j| {
            j.task_groups[0].count = 4;
            j.task_groups[0].tasks[0].resources.cpu = 900;
        })
        .await;
    assert!(h.cycle().await.is_empty());

    h.edit("web.yaml", "memory_mb: 256", "memory_mb: 512");
    let changed = h.cycle().await;
    assert_eq!(changed.update.keys().collect::<Vec<_>>(), vec!["web"]);

    let live = h.backend.get("default", "web").await.expect("web");
    assert_eq!(live.task_groups[0].count, 4);
    assert_eq!(live.task_groups[0].tasks[0].resources.cpu, 900);
    assert_eq!(live.task_groups[0].tasks[0].resources.memory_mb, 512);
}

#[tokio::test]
async fn new_revision_without_job_changes_applies_only_when_forced() {
    let mut h = Harness::new();
    h.cycle().await;
    let registered = h.backend.register_count().await;

    h.edit("web.yaml", "name: web\n", "name: web\n# touched\n");
    assert!(h.cycle().await.is_empty());
    assert_eq!(h.backend.register_count().await, registered);

    h.edit("web.yaml", "# touched\n", "# touched twice\n");
    h.source.force = true;
    let changed = h.cycle().await;
    // The revision is shared by every job of the source.
    assert_eq!(changed.update.keys().collect::<Vec<_>>(), vec!["batch", "web"]);
    assert_eq!(h.backend.register_count().await, registered + 2);
}
