//! The catalog-update loop (§4.5.2): periodically merges archived-log rows
//! with hash-store entries into the durable catalog. Scheduling
//! (tick interval, cancellation) lives here; the cycle body itself is the
//! pure-ish [`pitr_catalog::update_cycle`], driven directly by tests without
//! a clock or a loop around it.

use std::sync::Arc;
use std::time::Duration;

use pitr_catalog::{merge, LogMetadata};
use pitr_db::{ArchiveDirCache, DbQuery, Queries};
use pitr_kv::SimpleStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;

pub struct CatalogLoop {
    db: Arc<dyn DbQuery>,
    queries: Queries,
    archive_dir: Arc<ArchiveDirCache>,
    catalog_store: Arc<SimpleStore>,
    hash_store: Arc<SimpleStore>,
    period: Duration,
}

impl CatalogLoop {
    pub fn new(
        db: Arc<dyn DbQuery>,
        queries: Queries,
        archive_dir: Arc<ArchiveDirCache>,
        catalog_store: Arc<SimpleStore>,
        hash_store: Arc<SimpleStore>,
        period: Duration,
    ) -> Self {
        Self {
            db,
            queries,
            archive_dir,
            catalog_store,
            hash_store,
            period,
        }
    }

    /// Runs one catalog-update cycle and records its metrics.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> pitr_catalog::Result<()> {
        let stats = pitr_catalog::update_cycle(
            self.db.as_ref(),
            &self.queries,
            &self.archive_dir,
            &self.catalog_store,
            &self.hash_store,
            chrono::Utc::now(),
            cancel,
        )
        .await?;
        metrics::CATALOG_ROWS_SEEN.inc_by(stats.rows_seen as u64);

        let lock = self.catalog_store.lock().await;
        if let Ok(catalog) = self.catalog_store.read::<LogMetadata>(&lock, pitr_catalog::CATALOG_KEY).await {
            metrics::CATALOG_SIZE.set(catalog.len() as i64);
            debug!(recoverable_ranges = merge(&catalog).len(), "catalog cycle recomputed recoverable windows");
        }
        drop(lock);
        Ok(())
    }

    /// Runs the periodic loop until `cancel` fires. Every cycle's failure is
    /// logged and retried at the next tick; the loop itself never returns an
    /// error.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("catalog loop stopping on cancellation");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_cycle(&cancel).await {
                        Ok(()) => info!("catalog cycle completed"),
                        Err(pitr_catalog::Error::Cancelled) => info!("catalog cycle stopped early on cancellation"),
                        Err(e) => warn!(error = %e, "catalog cycle failed, will retry next period"),
                    }
                }
            }
        }
    }
}
