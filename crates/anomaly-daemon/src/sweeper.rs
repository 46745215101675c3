//! Periodic expiry sweep

use anomaly_store::{AnomalyStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Calls [`AnomalyStore::purge_expired`] on a fixed interval until shutdown.
pub struct Sweeper {
    store: Arc<dyn AnomalyStore>,
    every: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn AnomalyStore>, every: Duration) -> Self {
        Self { store, every }
    }

    pub async fn sweep_once(&self) -> StoreResult<usize> {
        self.store.purge_expired().await
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        tracing::info!(every_secs = self.every.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(purged) => tracing::debug!(purged, "Expiry sweep finished"),
                        Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
