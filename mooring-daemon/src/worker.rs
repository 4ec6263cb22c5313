//! Per-source reconciliation loop.
//!
//! One task per watched source. Each cycle fetches the desired state,
//! resolves the vault token, applies overrides, reconciles and publishes
//! the resulting status. Cycles run strictly one after another; signals
//! that arrive mid-cycle wait in the queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use mooring_core::error::CoreError;
use mooring_core::ports::{DesiredStateWatcher, Notifier, SourceStatusPatcher, VaultTokenRepo};
use mooring_core::types::{
    ChangeInfo, NotificationKind, NotifyInfo, NotifyOptions, Source, SourceStatus, SyncStatus,
};
use mooring_sync::{apply_overrides, inject_vault_token, SourceReconciler, SyncError};

use crate::config::DaemonConfig;

pub const WATCHED_SOURCES_GAUGE: &str = "mooring_watched_sources";
pub const RECONCILIATIONS_COUNTER: &str = "mooring_reconciliations_total";

/// Control message delivered to a running loop.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Run a cycle now.
    Sync { force_restart: bool },
    /// Flip the paused flag. Does not run a cycle and leaves the timer alone.
    Pause(bool),
    /// Replace the source value and run a cycle with it.
    Update(Source),
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub polling_interval: Duration,
    pub error_threshold: u32,
    pub app_name: String,
}

impl LoopSettings {
    /// A threshold of zero behaves like one: the first failure notifies.
    fn threshold(&self) -> u32 {
        self.error_threshold.max(1)
    }
}

impl From<&DaemonConfig> for LoopSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            polling_interval: config.polling_interval,
            error_threshold: config.error_retry_count,
            app_name: config.app_name.clone(),
        }
    }
}

/// Collaborators shared by every loop.
#[derive(Clone)]
pub struct LoopContext {
    pub watcher: Arc<dyn DesiredStateWatcher>,
    pub tokens: Arc<dyn VaultTokenRepo>,
    pub status: Arc<dyn SourceStatusPatcher>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: LoopSettings,
}

/// Why a loop returned.
pub(crate) enum Exit {
    /// Every signal sender is gone.
    Closed,
    /// A cycle panicked; carries the source value the loop held.
    Fault(Source),
}

#[derive(Debug, Error)]
enum CycleError {
    #[error("Could not fetch desired state: {0}")]
    Fetch(#[source] CoreError),
    #[error("Could not resolve vault token: {0}")]
    Token(#[source] CoreError),
    #[error("Could not reconcile: {0}")]
    Reconcile(#[source] SyncError),
}

impl CycleError {
    fn summary(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "Could not fetch desired state",
            CycleError::Token(_) => "Could not resolve vault token",
            CycleError::Reconcile(_) => "Could not reconcile",
        }
    }
}

pub(crate) struct Worker {
    source: Source,
    reconciler: Arc<dyn SourceReconciler>,
    ctx: LoopContext,
    /// Consecutive failed cycles.
    errors: u32,
}

impl Worker {
    pub(crate) fn new(source: Source, reconciler: Arc<dyn SourceReconciler>, ctx: LoopContext) -> Self {
        Self {
            source,
            reconciler,
            ctx,
            errors: 0,
        }
    }

    /// Drive cycles until every sender is dropped or a cycle panics.
    ///
    /// `announce` publishes the `init` status first; a loop restarted after
    /// a fault skips it.
    pub(crate) async fn run(mut self, mut signals: mpsc::Receiver<Signal>, announce: bool) -> Exit {
        let _gauge = WatchedGauge::new(&self.ctx.settings.app_name);
        info!(
            source_id = %self.source.id,
            url = %self.source.url,
            path = %self.source.path,
            "starting watch",
        );
        if announce {
            self.publish(&SourceStatus::new(SyncStatus::Init, "Waiting on first sync"))
                .await;
        }

        let interval = self.ctx.settings.polling_interval;
        let mut deadline = Instant::now() + interval;
        loop {
            let restart = tokio::select! {
                _ = sleep_until(deadline) => false,
                signal = signals.recv() => match signal {
                    None => {
                        info!(source_id = %self.source.id, "stopped watch");
                        return Exit::Closed;
                    }
                    Some(Signal::Sync { force_restart }) => force_restart,
                    Some(Signal::Pause(paused)) => {
                        info!(source_id = %self.source.id, paused, "pause state changed");
                        self.source.paused = paused;
                        continue;
                    }
                    Some(Signal::Update(source)) => {
                        info!(source_id = %self.source.id, url = %source.url, path = %source.path, "updating watch");
                        self.source = source;
                        false
                    }
                },
            };

            let outcome = AssertUnwindSafe(self.cycle(restart)).catch_unwind().await;
            deadline = Instant::now() + interval;
            if let Err(panic) = outcome {
                error!(
                    source_id = %self.source.id,
                    panic = %panic_message(panic.as_ref()),
                    "reconciliation cycle panicked",
                );
                return Exit::Fault(self.source);
            }
        }
    }

    async fn cycle(&mut self, restart: bool) {
        debug!(source_id = %self.source.id, restart, "starting reconciliation cycle");
        self.publish(&SourceStatus::new(SyncStatus::Syncing, "Syncing"))
            .await;

        let has_error = match self.sync_once(restart).await {
            Ok((status, changed)) => {
                self.succeeded(status, &changed, restart).await;
                false
            }
            Err(err) => {
                self.failed(&err, restart).await;
                true
            }
        };

        metrics::counter!(
            RECONCILIATIONS_COUNTER,
            1u64,
            "app" => self.ctx.settings.app_name.clone(),
            "source" => self.source.id.0.clone(),
            "has_error" => has_error.to_string()
        );
    }

    async fn sync_once(&self, restart: bool) -> Result<(SourceStatus, ChangeInfo), CycleError> {
        let mut desired = self
            .ctx
            .watcher
            .fetch_desired_state(&self.source)
            .await
            .map_err(CycleError::Fetch)?;

        if let Some(token_id) = self.source.vault_token_id.as_deref().filter(|t| !t.is_empty()) {
            let token = self
                .ctx
                .tokens
                .get_vault_token(token_id)
                .await
                .map_err(CycleError::Token)?;
            inject_vault_token(&mut desired, &token);
        }

        apply_overrides(&self.source, &mut desired);

        self.reconciler
            .reconcile(&self.source, desired, restart)
            .await
            .map_err(CycleError::Reconcile)
    }

    async fn succeeded(&mut self, mut status: SourceStatus, changed: &ChangeInfo, restart: bool) {
        if self.errors > 0 {
            let notified = self.errors >= self.ctx.settings.threshold();
            info!(source_id = %self.source.id, failed_cycles = self.errors, "source recovered");
            self.errors = 0;
            if notified {
                self.notify(
                    NotificationKind::Success,
                    "Synced successfully",
                    self.infos(restart),
                )
                .await;
            }
        }

        if self.source.paused {
            if changed.is_empty() {
                status.status = SyncStatus::Paused;
                status.message = "Still in sync".to_owned();
            } else {
                status.status = SyncStatus::OutOfSync;
                status.message = format!(
                    "Out of sync: {} to create, {} to update, {} to delete",
                    changed.create.len(),
                    changed.update.len(),
                    changed.delete.len()
                );
            }
        }

        status.determine_sync_status();
        self.publish(&status).await;
    }

    async fn failed(&mut self, err: &CycleError, restart: bool) {
        self.errors = self.errors.saturating_add(1);
        error!(
            source_id = %self.source.id,
            url = %self.source.url,
            path = %self.source.path,
            failed_cycles = self.errors,
            error = %err,
            "reconciliation cycle failed",
        );

        let status = SourceStatus {
            last_check_time: Some(Utc::now()),
            ..SourceStatus::new(SyncStatus::Error, err.to_string())
        };
        self.publish(&status).await;

        if self.errors == self.ctx.settings.threshold() {
            let mut infos = self.infos(restart);
            infos.push(NotifyInfo::large("Error", err.to_string()));
            self.notify(NotificationKind::Error, err.summary(), infos).await;
        }
    }

    fn infos(&self, restart: bool) -> Vec<NotifyInfo> {
        let src = &self.source;
        vec![
            NotifyInfo::new("Git-Url", &src.url),
            NotifyInfo::new("Git-Rev", &src.branch),
            NotifyInfo::new("Git-Repo-Path", &src.path),
            NotifyInfo::new("Nomad-Namespace", &src.namespace),
            NotifyInfo::new("Nomad-Region", &src.region),
            NotifyInfo::new("Nomad-DataCenter", &src.data_center),
            NotifyInfo::new("Force Restart", restart.to_string()),
        ]
    }

    async fn notify(&self, kind: NotificationKind, message: &str, infos: Vec<NotifyInfo>) {
        let options = NotifyOptions {
            source_id: self.source.id.clone(),
            kind,
            message: message.to_owned(),
            git_info: Default::default(),
            infos,
        };
        if let Err(err) = self.ctx.notifier.notify(&options).await {
            warn!(source_id = %self.source.id, error = %err, "could not notify");
        }
    }

    async fn publish(&self, status: &SourceStatus) {
        if let Err(err) = self.ctx.status.set_source_status(&self.source.id, status).await {
            warn!(source_id = %self.source.id, error = %err, "could not publish source status");
        }
    }
}

/// Keeps the watched-sources gauge in step with live loops, including aborted ones.
struct WatchedGauge {
    app: String,
}

impl WatchedGauge {
    fn new(app: &str) -> Self {
        metrics::increment_gauge!(WATCHED_SOURCES_GAUGE, 1.0, "app" => app.to_owned());
        Self { app: app.to_owned() }
    }
}

impl Drop for WatchedGauge {
    fn drop(&mut self) {
        metrics::decrement_gauge!(WATCHED_SOURCES_GAUGE, 1.0, "app" => self.app.clone());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
