//! Periodic Mastership Check
//!
//! Every interval the local node asks for a role on each reachable resource it
//! has no role for. Covers resources that appeared while no one was watching
//! and masters lost without a clean hand-over.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::coordinator::MastershipCoordinator;
use super::types::ResourceKey;

/// Source of the resources to check on each round.
pub type ResourceSource<R> = Arc<dyn Fn() -> Vec<R> + Send + Sync>;

/// Background reconciliation loop for one coordinator.
pub struct MastershipChecker<R: ResourceKey> {
    coordinator: Arc<MastershipCoordinator<R>>,
    resources: ResourceSource<R>,
    interval: Duration,
}

impl<R: ResourceKey> MastershipChecker<R> {
    pub fn new(
        coordinator: Arc<MastershipCoordinator<R>>,
        resources: ResourceSource<R>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            resources,
            interval,
        }
    }

    /// Run one reconciliation round.
    ///
    /// Writes may wait on resource locks, so the round runs on the blocking
    /// pool.
    pub async fn run_once(&self) -> usize {
        let coordinator = Arc::clone(&self.coordinator);
        let resources = (self.resources)();

        match tokio::task::spawn_blocking(move || coordinator.reconcile(resources)).await {
            Ok(report) => {
                for (resource, err) in &report.failed {
                    warn!(resource = %resource, error = %err, "mastership check request failed");
                }
                report.requested.len()
            }
            Err(e) => {
                warn!(error = %e, "mastership check round aborted");
                0
            }
        }
    }

    /// Spawn the loop. It stops once `shutdown` turns true or its sender is
    /// dropped, and yields the number of completed rounds.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            let mut rounds = 0u64;

            info!(
                node = %self.coordinator.local_node(),
                interval_ms = self.interval.as_millis() as u64,
                "mastership checker started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let requested = self.run_once().await;
                        rounds += 1;
                        debug!(round = rounds, requested, "mastership check round");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(rounds, "mastership checker stopped");
            rounds
        })
    }
}
