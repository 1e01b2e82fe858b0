//! The retention loop (§4.5.3): periodically sweeps the catalog for entries
//! whose logical time range has fallen out of the retention window,
//! deleting their replicas and hash-store entries.

use std::sync::Arc;
use std::time::Duration;

use pitr_kv::SimpleStore;
use pitr_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::metrics;

pub struct RetentionLoop {
    storage: Arc<dyn Storage>,
    catalog_store: Arc<SimpleStore>,
    hash_store: Arc<SimpleStore>,
    clock: Arc<dyn Clock>,
    retention_days: i64,
    period: Duration,
}

impl RetentionLoop {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog_store: Arc<SimpleStore>,
        hash_store: Arc<SimpleStore>,
        clock: Arc<dyn Clock>,
        retention_days: i64,
        period: Duration,
    ) -> Self {
        Self {
            storage,
            catalog_store,
            hash_store,
            clock,
            retention_days,
            period,
        }
    }

    /// Runs one sweep and records how many entries it evicted.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> pitr_catalog::Result<usize> {
        let deleted = pitr_catalog::sweep(
            self.storage.as_ref(),
            &self.catalog_store,
            &self.hash_store,
            self.clock.now(),
            self.retention_days,
            cancel,
        )
        .await?;
        metrics::RETENTION_DELETIONS.with_label_values(&["deleted"]).inc_by(deleted as u64);
        Ok(deleted)
    }

    /// Runs the periodic loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("retention loop stopping on cancellation");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_cycle(&cancel).await {
                        Ok(deleted) => info!(deleted, "retention sweep completed"),
                        Err(pitr_catalog::Error::Cancelled) => info!("retention sweep stopped early on cancellation"),
                        Err(e) => warn!(error = %e, "retention sweep failed, will retry next period"),
                    }
                }
            }
        }
    }
}
