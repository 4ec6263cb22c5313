//! Registry of running per-source loops and signal routing.
//!
//! The registry lock guards only map lookups and mutations. Senders are
//! cloned out before a signal is delivered, so a loop with a full queue
//! never blocks registration of other sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use mooring_core::giturl;
use mooring_core::registry::validate_source_id;
use mooring_core::types::{Source, SourceId};
use mooring_sync::SourceReconciler;

use crate::error::DaemonError;
use crate::worker::{Exit, LoopContext, Signal, Worker};

/// Per-loop signal queue depth.
const SIGNAL_QUEUE: usize = 16;

struct WatchHandle {
    /// Last source value routed to the loop.
    source: Source,
    generation: u64,
    signals: mpsc::Sender<Signal>,
    task: JoinHandle<()>,
}

struct Inner {
    ctx: LoopContext,
    watches: Mutex<HashMap<SourceId, WatchHandle>>,
    generations: AtomicU64,
    faults: mpsc::UnboundedSender<DaemonError>,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Returns the supervisor and the channel on which unrecoverable loop
    /// faults are reported. The runtime treats anything received there as fatal.
    pub fn new(ctx: LoopContext) -> (Self, mpsc::UnboundedReceiver<DaemonError>) {
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            ctx,
            watches: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            faults,
        });
        (Self { inner }, fault_rx)
    }

    fn watches(&self) -> Result<MutexGuard<'_, HashMap<SourceId, WatchHandle>>, DaemonError> {
        self.inner
            .watches
            .lock()
            .map_err(|_| DaemonError::RegistryPoisoned)
    }

    /// Start a loop for `source` unless one is already running.
    ///
    /// Returns `true` when a new loop was started. Only this first
    /// registration publishes the `init` status.
    pub fn watch(
        &self,
        source: Source,
        reconciler: Arc<dyn SourceReconciler>,
    ) -> Result<bool, DaemonError> {
        validate_source_id(&source.id)?;
        let mut watches = self.watches()?;
        if watches.contains_key(&source.id) {
            debug!(source_id = %source.id, "already watching");
            return Ok(false);
        }
        let handle = self.spawn(source, reconciler, true);
        watches.insert(handle.source.id.clone(), handle);
        Ok(true)
    }

    fn spawn(
        &self,
        source: Source,
        reconciler: Arc<dyn SourceReconciler>,
        announce: bool,
    ) -> WatchHandle {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let (signals, rx) = mpsc::channel(SIGNAL_QUEUE);
        let worker = Worker::new(source.clone(), reconciler.clone(), self.inner.ctx.clone());
        let supervisor = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            if let Exit::Fault(source) = worker.run(rx, announce).await {
                restart_after_fault(supervisor, generation, source, reconciler);
            }
        });
        WatchHandle {
            source,
            generation,
            signals,
            task,
        }
    }

    /// Replace a faulted loop with a fresh one, unless it was stopped meanwhile.
    fn rewatch(
        &self,
        generation: u64,
        source: Source,
        reconciler: Arc<dyn SourceReconciler>,
    ) -> Result<bool, DaemonError> {
        let mut watches = self.watches()?;
        match watches.get(&source.id) {
            Some(handle) if handle.generation == generation => {}
            _ => return Ok(false),
        }
        let handle = self.spawn(source, reconciler, false);
        watches.insert(handle.source.id.clone(), handle);
        Ok(true)
    }

    /// Stop and forget the loop for `id`.
    ///
    /// Once this returns the loop has terminated and makes no further
    /// collaborator calls. Returns `false` when nothing was watched.
    pub async fn stop_watch(&self, id: &SourceId) -> Result<bool, DaemonError> {
        let handle = {
            let mut watches = self.watches()?;
            watches.remove(id)
        };
        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.task.abort();
        let _ = handle.task.await;
        info!(source_id = %id, "stopped watching source");
        Ok(true)
    }

    /// Stop every loop; used on shutdown.
    pub async fn stop_all(&self) -> Result<(), DaemonError> {
        let handles: Vec<WatchHandle> = {
            let mut watches = self.watches()?;
            watches.drain().map(|(_, h)| h).collect()
        };
        for handle in &handles {
            handle.task.abort();
        }
        for handle in handles {
            let _ = handle.task.await;
        }
        Ok(())
    }

    pub fn is_watching(&self, id: &SourceId) -> Result<bool, DaemonError> {
        Ok(self.watches()?.contains_key(id))
    }

    /// Snapshot of the watched sources, sorted by id.
    pub fn watched(&self) -> Result<Vec<Source>, DaemonError> {
        let mut sources: Vec<Source> =
            self.watches()?.values().map(|h| h.source.clone()).collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sources)
    }

    fn sender(&self, id: &SourceId) -> Result<mpsc::Sender<Signal>, DaemonError> {
        self.watches()?
            .get(id)
            .map(|h| h.signals.clone())
            .ok_or_else(|| DaemonError::NotFound(id.0.clone()))
    }

    async fn deliver(sender: mpsc::Sender<Signal>, signal: Signal) -> Result<(), DaemonError> {
        sender
            .send(signal)
            .await
            .map_err(|_| DaemonError::ChannelClosed("source signal queue"))
    }

    pub async fn request_sync(&self, id: &SourceId, force_restart: bool) -> Result<(), DaemonError> {
        let sender = self.sender(id)?;
        info!(source_id = %id, force_restart, "sync requested");
        Self::deliver(sender, Signal::Sync { force_restart }).await
    }

    /// Sync every watched source tracking `branch` of repository `repo`
    /// (`org/repo`, or any URL naming it). Returns how many were signalled.
    pub async fn request_sync_by_repo_branch(
        &self,
        repo: &str,
        branch: &str,
        force_restart: bool,
    ) -> Result<usize, DaemonError> {
        let wanted = giturl::repo_path(repo).unwrap_or_else(|| repo.trim_matches('/').to_owned());
        let senders: Vec<(SourceId, mpsc::Sender<Signal>)> = {
            let watches = self.watches()?;
            watches
                .values()
                .filter(|h| h.source.branch == branch)
                .filter(|h| giturl::matches_repo(&h.source.url, &wanted))
                .map(|h| (h.source.id.clone(), h.signals.clone()))
                .collect()
        };
        if senders.is_empty() {
            return Err(DaemonError::NotFound(format!("{wanted}@{branch}")));
        }
        info!(repo = %wanted, branch, sources = senders.len(), "sync requested for repository");
        let count = senders.len();
        for (id, sender) in senders {
            debug!(source_id = %id, "signalling sync");
            Self::deliver(sender, Signal::Sync { force_restart }).await?;
        }
        Ok(count)
    }

    pub async fn request_pause(&self, id: &SourceId, paused: bool) -> Result<(), DaemonError> {
        let sender = {
            let mut watches = self.watches()?;
            let handle = watches
                .get_mut(id)
                .ok_or_else(|| DaemonError::NotFound(id.0.clone()))?;
            handle.source.paused = paused;
            handle.signals.clone()
        };
        info!(source_id = %id, paused, "pause requested");
        Self::deliver(sender, Signal::Pause(paused)).await
    }

    /// Hand a new source value to the running loop for `id`.
    ///
    /// The new value must keep the same id; renaming a source is a remove
    /// followed by an add.
    pub async fn update_source(&self, id: &SourceId, source: Source) -> Result<(), DaemonError> {
        if source.id != *id {
            return Err(DaemonError::Protocol(format!(
                "source id '{}' does not match watched source '{id}'",
                source.id
            )));
        }
        let sender = {
            let mut watches = self.watches()?;
            let handle = watches
                .get_mut(id)
                .ok_or_else(|| DaemonError::NotFound(id.0.clone()))?;
            handle.source = source.clone();
            handle.signals.clone()
        };
        info!(source_id = %id, "source update requested");
        Self::deliver(sender, Signal::Update(source)).await
    }
}

fn restart_after_fault(
    supervisor: Weak<Inner>,
    generation: u64,
    source: Source,
    reconciler: Arc<dyn SourceReconciler>,
) {
    let Some(inner) = supervisor.upgrade() else {
        return;
    };
    let supervisor = Supervisor { inner };
    let id = source.id.clone();
    match supervisor.rewatch(generation, source, reconciler) {
        Ok(true) => info!(source_id = %id, "restarted watch after fault"),
        Ok(false) => debug!(source_id = %id, "watch was stopped while faulting"),
        Err(err) => {
            error!(source_id = %id, error = %err, "could not restart watch after fault");
            let _ = supervisor.inner.faults.send(err);
        }
    }
}
