//! The log-syncer loop (§4.4): periodically walks the database's archive
//! directory and replicates newly archived logs. Scheduling (tick interval,
//! the initial fatal directory resolution, cancellation) lives here, same
//! shape as [`crate::catalog_loop::CatalogLoop`] and
//! [`crate::retention_loop::RetentionLoop`] — each owns its own tick loop
//! specifically so it can record its own cycle's metrics, rather than
//! delegating straight to the lower-level crate's `run`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pitr_db::{ArchiveDirCache, DbQuery, Queries};
use pitr_sync::{Error, LogSyncer, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics;

pub struct SyncLoop {
    db: Arc<dyn DbQuery>,
    queries: Queries,
    archive_dir: Arc<ArchiveDirCache>,
    syncer: Arc<LogSyncer>,
    period: Duration,
}

impl SyncLoop {
    pub fn new(db: Arc<dyn DbQuery>, queries: Queries, archive_dir: Arc<ArchiveDirCache>, syncer: Arc<LogSyncer>, period: Duration) -> Self {
        Self {
            db,
            queries,
            archive_dir,
            syncer,
            period,
        }
    }

    /// Runs one sync cycle and records its outcome into the `pitr_sync_*`
    /// statics: cycle duration always, and, depending on outcome, files
    /// handled / bytes shipped (success) or file failures (either outcome).
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<pitr_sync::SyncStats> {
        let started = Instant::now();
        let result = self.syncer.run_cycle(cancel).await;
        metrics::SYNC_CYCLE_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(stats) => {
                metrics::SYNC_FILES_COPIED.inc_by(stats.files_enqueued as u64);
                metrics::SYNC_BYTES_COPIED.inc_by(stats.bytes_copied);
            }
            Err(Error::Replication { failures, .. }) => {
                metrics::SYNC_FILE_ERRORS.inc_by(*failures);
            }
            Err(_) => {}
        }
        result
    }

    /// Runs the periodic loop until `cancel` fires. The very first directory
    /// resolution is fatal, as in `pitr_sync::LogSyncer::run`; every later
    /// cycle's failure is logged and retried at the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        self.archive_dir.get_or_query(self.db.as_ref(), &self.queries).await?;

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sync loop stopping on cancellation");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitr_db::testing::FakeDb;
    use pitr_kv::SimpleStore;
    use pitr_replication::ReplicationGroup;
    use pitr_storage::{mem::MemStorage, Storage};
    use pitr_sync::SyncConfig;

    fn recovery_dest_row(dir: &str) -> pitr_db::Row {
        let mut row = pitr_db::Row::new();
        row.insert("NAME".to_string(), dir.to_string());
        row
    }

    #[tokio::test]
    async fn one_cycle_records_files_and_bytes_into_the_sync_metrics() {
        let fake = FakeDb::new();
        let queries = Queries::default();
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("o1.arc"), b"redo bytes").unwrap();
        fake.on(queries.recovery_dest.clone(), vec![recovery_dest_row(&tmp.path().display().to_string())])
            .await;

        let db: Arc<dyn DbQuery> = Arc::new(fake);
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let hash_store = Arc::new(SimpleStore::new(storage.clone(), "data/".to_string()));
        let replication = Arc::new(ReplicationGroup::new(storage.clone(), hash_store, 2));
        let archive_dir = Arc::new(ArchiveDirCache::new());

        let syncer = Arc::new(LogSyncer::new(
            db.clone(),
            queries.clone(),
            archive_dir.clone(),
            storage.clone(),
            replication,
            "gs://bucket/arch",
            SyncConfig::default(),
        ));
        let looper = SyncLoop::new(db, queries, archive_dir, syncer, Duration::from_secs(60));

        let before_files = metrics::SYNC_FILES_COPIED.get();
        let before_bytes = metrics::SYNC_BYTES_COPIED.get();

        let cancel = CancellationToken::new();
        let stats = looper.run_cycle(&cancel).await.unwrap();
        assert_eq!(stats.files_enqueued, 1);

        assert_eq!(metrics::SYNC_FILES_COPIED.get(), before_files + 1);
        assert_eq!(metrics::SYNC_BYTES_COPIED.get(), before_bytes + "redo bytes".len() as u64);
    }

    #[tokio::test]
    async fn a_failed_cycle_records_file_errors() {
        let fake = FakeDb::new();
        let queries = Queries::default();
        fake.on(queries.recovery_dest.clone(), vec![recovery_dest_row("/no/such/directory")])
            .await;

        let db: Arc<dyn DbQuery> = Arc::new(fake);
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let hash_store = Arc::new(SimpleStore::new(storage.clone(), "data/".to_string()));
        let replication = Arc::new(ReplicationGroup::new(storage.clone(), hash_store, 2));
        let archive_dir = Arc::new(ArchiveDirCache::new());

        let syncer = Arc::new(LogSyncer::new(
            db.clone(),
            queries.clone(),
            archive_dir.clone(),
            storage,
            replication,
            "gs://bucket/arch",
            SyncConfig::default(),
        ));
        let looper = SyncLoop::new(db, queries, archive_dir, syncer, Duration::from_secs(60));

        let before = metrics::SYNC_FILE_ERRORS.get();
        let cancel = CancellationToken::new();
        let err = looper.run_cycle(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Replication { failures: 1, .. }));
        assert_eq!(metrics::SYNC_FILE_ERRORS.get(), before + 1);
    }
}
