//! Entry point for source lifecycle events.

use std::sync::Arc;

use tracing::info;

use mooring_core::ports::SourceRepo;
use mooring_core::types::{Source, SourceId};
use mooring_sync::SourceReconciler;

use crate::error::DaemonError;
use crate::supervisor::Supervisor;

pub struct Manager {
    supervisor: Supervisor,
    sources: Arc<dyn SourceRepo>,
    reconciler: Arc<dyn SourceReconciler>,
}

impl Manager {
    pub fn new(
        supervisor: Supervisor,
        sources: Arc<dyn SourceRepo>,
        reconciler: Arc<dyn SourceReconciler>,
    ) -> Self {
        Self {
            supervisor,
            sources,
            reconciler,
        }
    }

    /// Watch every known source. Returns how many loops were started.
    pub async fn start(&self) -> Result<usize, DaemonError> {
        let sources = self.sources.list_sources().await?;
        let mut started = 0;
        for source in sources {
            if self.supervisor.watch(source, self.reconciler.clone())? {
                started += 1;
            }
        }
        info!(sources = started, "watching configured sources");
        Ok(started)
    }

    pub fn on_added_source(&self, source: Source) -> Result<bool, DaemonError> {
        self.supervisor.watch(source, self.reconciler.clone())
    }

    pub async fn on_deleted_source(&self, id: &SourceId) -> Result<bool, DaemonError> {
        self.supervisor.stop_watch(id).await
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>, DaemonError> {
        Ok(self.sources.list_sources().await?)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}
