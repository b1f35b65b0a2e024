//! Fire-and-forget dispatch group
//!
//! Each hardware command runs on its own short-lived task so transport latency
//! never delays the timing loop. The only join is [`DispatchGroup::settle`],
//! bounded by a grace window.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct DispatchGroup {
    tracker: TaskTracker,
    failures: Arc<AtomicUsize>,
}

impl DispatchGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a dispatch; a failure is logged and counted, never propagated
    pub fn spawn<F>(&self, what: String, dispatch: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let failures = self.failures.clone();
        self.tracker.spawn(async move {
            if let Err(e) = dispatch.await {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dispatch of {} failed: {}", what, e);
            }
        });
    }

    /// Dispatches still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Wait for outstanding dispatches, never longer than `grace`
    ///
    /// Tasks that miss the window keep running detached; the group stays
    /// usable afterwards.
    pub async fn settle(&self, grace: Duration) -> Result<()> {
        self.tracker.close();
        let waited = tokio::time::timeout(grace, self.tracker.wait()).await;
        self.tracker.reopen();

        match waited {
            Ok(()) => {
                debug!("All dispatches settled");
                Ok(())
            }
            Err(_) => {
                warn!(
                    "{} dispatches still in flight after {:?}, continuing shutdown",
                    self.tracker.len(),
                    grace
                );
                Err(Error::ShutdownTimeout(grace))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_waits_for_quick_dispatches() {
        let group = DispatchGroup::new();
        for _ in 0..4 {
            group.spawn("quick".into(), async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            });
        }
        group.settle(Duration::from_millis(500)).await.unwrap();
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_settle_is_bounded_by_grace() {
        let group = DispatchGroup::new();
        group.spawn("stuck".into(), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });

        let started = std::time::Instant::now();
        let result = group.settle(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ShutdownTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let group = DispatchGroup::new();
        group.spawn("broken".into(), async { Err(Error::Transport("bus down".into())) });
        group.spawn("fine".into(), async { Ok(()) });
        group.settle(Duration::from_millis(500)).await.unwrap();
        assert_eq!(group.failures(), 1);
    }
}
