//! Notifier adapters.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use mooring_core::error::CoreError;
use mooring_core::ports::Notifier;
use mooring_core::types::{NotificationKind, NotifyOptions};

/// Writes every notification to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, options: &NotifyOptions) -> Result<(), CoreError> {
        let infos = options
            .infos
            .iter()
            .map(|i| format!("{}={}", i.header, i.text))
            .collect::<Vec<_>>()
            .join(", ");
        match options.kind {
            NotificationKind::Success => {
                info!(source_id = %options.source_id, infos = %infos, "{}", options.message)
            }
            NotificationKind::Error => {
                error!(source_id = %options.source_id, infos = %infos, "{}", options.message)
            }
        }
        Ok(())
    }
}

/// Delivers to every configured notifier, even when some of them fail.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, options: &NotifyOptions) -> Result<(), CoreError> {
        let mut failures = Vec::new();
        for target in &self.targets {
            if let Err(err) = target.notify(options).await {
                failures.push(err.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Backend(format!(
                "{} of {} notifiers failed: {}",
                failures.len(),
                self.targets.len(),
                failures.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mooring_core::types::{GitInfo, NotifyInfo, SourceId};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Counting {
        async fn notify(&self, _options: &NotifyOptions) -> Result<(), CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoreError::Backend("webhook returned 500".into()))
            } else {
                Ok(())
            }
        }
    }

    fn options() -> NotifyOptions {
        NotifyOptions {
            source_id: SourceId::from("web"),
            kind: NotificationKind::Error,
            message: "Could not reconcile".into(),
            git_info: GitInfo::default(),
            infos: vec![NotifyInfo::large("Error", "boom")],
        }
    }

    #[tokio::test]
    async fn every_target_is_tried_and_failures_aggregate() {
        let broken = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let healthy = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let targets: Vec<Arc<dyn Notifier>> = vec![broken.clone(), healthy.clone(), Arc::new(LogNotifier)];
        let fanout = FanoutNotifier::new(targets);

        let err = fanout.notify(&options()).await.unwrap_err();
        assert!(err.to_string().contains("1 of 3 notifiers failed"));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_fanout_succeeds() {
        let fanout = FanoutNotifier::default();
        fanout.notify(&options()).await.expect("notify");
    }
}
