//! Wires the Storage Abstraction, Simple Store, Replication Group, Log
//! Syncer, and Catalog Manager into one [`PitrEngine`] that a caller (the
//! out-of-scope Kubernetes reconciler) constructs once per database
//! instance and runs as a set of cooperating tokio tasks under one
//! [`CancellationToken`].
//!
//! This crate owns only orchestration: scheduling, cancellation, metrics,
//! and error collapsing. The cycle bodies themselves live in `pitr-sync` and
//! `pitr-catalog` and are unit-tested there without a clock or a loop
//! around them.

mod catalog_loop;
pub mod clock;
pub mod config;
mod error;
pub mod metrics;
mod retention_loop;
mod sync_loop;

use std::sync::Arc;

use pitr_catalog::LogMetadataEntry;
use pitr_db::{ArchiveDirCache, DbQuery, Queries};
use pitr_kv::SimpleStore;
use pitr_replication::ReplicationGroup;
use pitr_storage::Storage;
use pitr_sync::{configure_archive_lag, LogSyncer, SyncConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use clock::{Clock, SystemClock};
pub use config::PitrConfig;
pub use error::{Error, Result};

/// One database instance's PITR engine: the durable stores, the replication
/// pool they share, and the three long-running loops from §4.4/§4.5 that
/// drive them.
pub struct PitrEngine {
    db: Arc<dyn DbQuery>,
    queries: Queries,
    storage: Arc<dyn Storage>,
    catalog_store: Arc<SimpleStore>,
    hash_store: Arc<SimpleStore>,
    replication: Arc<ReplicationGroup>,
    archive_dir: Arc<ArchiveDirCache>,
    clock: Arc<dyn Clock>,
    config: PitrConfig,
}

impl PitrEngine {
    pub fn new(
        config: PitrConfig,
        db: Arc<dyn DbQuery>,
        queries: Queries,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        metrics::register();
        let hash_store = Arc::new(SimpleStore::new(storage.clone(), config.data_dir.clone()));
        let catalog_store = Arc::new(SimpleStore::new(storage.clone(), config.data_dir.clone()));
        let replication = Arc::new(ReplicationGroup::new(storage.clone(), hash_store.clone(), config.replication_thread_count));
        Self {
            db,
            queries,
            storage,
            catalog_store,
            hash_store,
            replication,
            archive_dir: Arc::new(ArchiveDirCache::new()),
            clock,
            config,
        }
    }

    /// Constructs an engine with the default system clock. The common case
    /// for real deployments; tests that need deterministic retention windows
    /// use [`PitrEngine::new`] directly with a fixed clock.
    pub fn with_system_clock(config: PitrConfig, db: Arc<dyn DbQuery>, queries: Queries, storage: Arc<dyn Storage>) -> Self {
        Self::new(config, db, queries, storage, Arc::new(SystemClock))
    }

    /// Runs the archive-lag one-shot, then every long-running loop, until
    /// `cancel` fires. Loops never return an error themselves (their own
    /// cycle failures are logged and retried); this only returns early if a
    /// loop task panics or is dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        configure_archive_lag(self.db.as_ref(), &self.queries).await;

        let syncer = Arc::new(LogSyncer::new(
            self.db.clone(),
            self.queries.clone(),
            self.archive_dir.clone(),
            self.storage.clone(),
            self.replication.clone(),
            self.config.dest_dir.clone(),
            SyncConfig {
                period: self.config.sync_interval(),
                deadline: self.config.sync_timeout(),
            },
        ));
        let sync_loop = Arc::new(sync_loop::SyncLoop::new(
            self.db.clone(),
            self.queries.clone(),
            self.archive_dir.clone(),
            syncer,
            self.config.sync_interval(),
        ));
        let catalog_loop = Arc::new(catalog_loop::CatalogLoop::new(
            self.db.clone(),
            self.queries.clone(),
            self.archive_dir.clone(),
            self.catalog_store.clone(),
            self.hash_store.clone(),
            self.config.sync_interval(),
        ));
        let retention_loop = Arc::new(retention_loop::RetentionLoop::new(
            self.storage.clone(),
            self.catalog_store.clone(),
            self.hash_store.clone(),
            self.clock.clone(),
            self.config.retention_days,
            self.config.cleanup_interval(),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        tasks.spawn({
            let cancel = cancel.clone();
            async move {
                if let Err(e) = sync_loop.run(cancel).await {
                    warn!(error = %e, "log syncer exited");
                }
            }
        });
        tasks.spawn(catalog_loop.run(cancel.clone()));
        tasks.spawn(retention_loop.run(cancel.clone()));

        while tasks.join_next().await.is_some() {}
        info!("PITR engine stopped");
        Ok(())
    }

    /// On-demand staging (§4.5.5): copies every catalog entry `include`
    /// selects into `dest_dir`, named by original source basename.
    pub async fn stage(
        &self,
        dest_dir: &str,
        include: impl Fn(&str, &LogMetadataEntry) -> bool,
    ) -> pitr_catalog::Result<pitr_replication::RunStats> {
        pitr_catalog::stage(self.storage.as_ref(), &self.replication, &self.catalog_store, dest_dir, include).await
    }
}
