//! The Log Syncer: a periodic loop that discovers newly archived redo logs
//! under the database's current archive destination and replicates them out
//! to durable storage, plus the one-shot archive-lag nudge that runs once
//! before it.

mod archive_lag;
mod error;
mod walk;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pitr_db::{ArchiveDirCache, DbQuery, Queries};
use pitr_replication::ReplicationGroup;
use pitr_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use archive_lag::configure_archive_lag;
pub use error::{Error, Result};

/// Default sync period: how often the syncer walks the source directory.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
/// Default per-cycle hard deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub period: Duration,
    pub deadline: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub files_enqueued: usize,
    pub failures: u64,
    pub bytes_copied: u64,
}

pub struct LogSyncer {
    db: Arc<dyn DbQuery>,
    queries: Queries,
    archive_dir: Arc<ArchiveDirCache>,
    storage: Arc<dyn Storage>,
    replication: Arc<ReplicationGroup>,
    dest_root: String,
    config: SyncConfig,
}

impl LogSyncer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn DbQuery>,
        queries: Queries,
        archive_dir: Arc<ArchiveDirCache>,
        storage: Arc<dyn Storage>,
        replication: Arc<ReplicationGroup>,
        dest_root: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            queries,
            archive_dir,
            storage,
            replication,
            dest_root: dest_root.into(),
            config,
        }
    }

    /// Runs the periodic loop until `cancel` fires. The very first directory
    /// resolution is fatal: without it the syncer has nothing to walk.
    /// Every later cycle's own failures (walk errors, copy failures, a blown
    /// deadline, a directory re-query that didn't pan out) are logged and
    /// retried at the next tick rather than ending the loop.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        self.archive_dir.get_or_query(self.db.as_ref(), &self.queries).await?;

        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("log syncer stopping on cancellation");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.run_cycle(&cancel).await {
                        Ok(stats) => info!(files = stats.files_enqueued, "sync cycle completed"),
                        Err(Error::Cancelled) => info!("sync cycle stopped early on cancellation"),
                        Err(e) => warn!(error = %e, "sync cycle failed, will retry next period"),
                    }
                }
            }
        }
    }

    /// Runs exactly one cycle: resolve the archive directory, walk it,
    /// replicate everything found, and (on success) re-query the directory
    /// for the next cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<SyncStats> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let dir = self.archive_dir.get_or_query(self.db.as_ref(), &self.queries).await?;

        let (tx, rx) = async_channel::bounded(1);
        let storage = self.storage.as_ref();
        let walk = walk::walk_and_enqueue(storage, Path::new(&dir), &self.dest_root, tx, cancel);
        let replicate = self.replication.run(rx);

        let (walk_stats, run_stats) = tokio::time::timeout(self.config.deadline, async { tokio::join!(walk, replicate) })
            .await
            .map_err(|_| Error::Deadline)?;

        // The walk stops early and drops its sender as soon as `cancel`
        // fires, which drains the replication group's channel and lets the
        // join above finish promptly instead of running the full cycle;
        // report that as cancellation rather than a (possibly truncated)
        // success.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let failures = walk_stats.walk_errors + run_stats.errors;
        if failures > 0 {
            return Err(Error::Replication { op: "sync", failures });
        }

        self.archive_dir.refresh(self.db.as_ref(), &self.queries).await;
        Ok(SyncStats {
            files_enqueued: walk_stats.files_enqueued,
            failures,
            bytes_copied: run_stats.bytes_copied,
        })
    }
}
