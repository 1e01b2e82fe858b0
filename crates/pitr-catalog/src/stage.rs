//! On-demand staging: copies a contiguous subset of already-replicated logs
//! from the catalog back to a local filesystem so a recovery process can
//! consume them by their original names.

use std::path::Path;

use pitr_kv::SimpleStore;
use pitr_replication::{CopyJob, ReplicationGroup, RunStats};
use pitr_storage::Storage;

use crate::error::{Error, Result};
use crate::model::{LogMetadata, LogMetadataEntry};
use crate::retention::CATALOG_KEY;

/// Stages every catalog entry for which `include` returns `true` into
/// `dest_dir`, named by the entry's original source basename (not the
/// replica's basename).
///
/// Fails before any copy starts if the catalog is empty, or if any included
/// entry has no `replica_path` yet (a "gap"): staging a partial recovery
/// window silently would be worse than refusing it outright.
pub async fn stage(
    storage: &dyn Storage,
    replication: &ReplicationGroup,
    catalog_store: &SimpleStore,
    dest_dir: &str,
    include: impl Fn(&str, &LogMetadataEntry) -> bool,
) -> Result<RunStats> {
    let lock = catalog_store.lock().await;
    let catalog: LogMetadata = match catalog_store.read(&lock, CATALOG_KEY).await {
        Ok(c) => c,
        Err(e) if e.is_not_found() => LogMetadata::new(),
        Err(e) => return Err(e.into()),
    };
    drop(lock);

    if catalog.is_empty() {
        return Err(Error::EmptyCatalog);
    }

    let mut eligible = Vec::new();
    let mut gaps = Vec::new();
    for (key, entry) in catalog.iter() {
        if !include(key, entry) {
            continue;
        }
        if entry.is_replicated() {
            eligible.push(entry.clone());
        } else {
            gaps.push(key.clone());
        }
    }
    if !gaps.is_empty() {
        gaps.sort();
        return Err(Error::StageGap(gaps));
    }

    storage.mkdirp(dest_dir).await?;

    let dest_dir = dest_dir.trim_end_matches('/').to_string();
    let (tx, rx) = async_channel::bounded(1);
    let feed = async move {
        for entry in eligible {
            let basename = Path::new(&entry.src_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.src_path.clone());
            let job = CopyJob {
                src: entry.hash.replica_path.clone(),
                dest: format!("{dest_dir}/{basename}"),
            };
            if tx.send(job).await.is_err() {
                break;
            }
        }
    };
    let (_, stats) = tokio::join!(feed, replication.run_copy(rx));
    if stats.errors > 0 {
        return Err(Error::Replication {
            op: "stage",
            failures: stats.errors,
        });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::composite_key;
    use chrono::Utc;
    use pitr_kv::LogHashEntry;
    use pitr_storage::{mem::MemStorage, Crc32cHash};
    use std::sync::Arc;

    fn entry(sequence: &str, replica_path: &str, src_name: &str) -> LogMetadataEntry {
        LogMetadataEntry {
            hash: LogHashEntry {
                crc32c_hash: Crc32cHash::ZERO,
                replica_path: replica_path.to_string(),
                mod_time: Utc::now(),
            },
            src_path: format!("/u01/arch/2021_09_01/{src_name}"),
            first_change: "1".to_string(),
            next_change: "2".to_string(),
            first_time: Utc::now(),
            next_time: Utc::now(),
            completion_time: Utc::now().to_rfc3339(),
            sequence: sequence.to_string(),
            incarnation: "2".to_string(),
            thread: "1".to_string(),
        }
    }

    async fn seed_replica(storage: &Arc<dyn Storage>, path: &str, bytes: &[u8]) {
        let mut w = storage.write(path).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut w, bytes).await.unwrap();
        w.commit().await.unwrap();
    }

    #[tokio::test]
    async fn stages_eligible_entries_under_original_basenames() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let replication = ReplicationGroup::new(storage.clone(), Arc::new(hash_store), 2);

        seed_replica(&storage, "gs://bucket/replica/5.arc", b"five").await;
        seed_replica(&storage, "gs://bucket/replica/6.arc", b"six").await;

        let mut catalog = LogMetadata::new();
        catalog.insert(composite_key("1", "2", "5"), entry("5", "gs://bucket/replica/5.arc", "o1_mf_1_5.arc"));
        catalog.insert(composite_key("1", "2", "6"), entry("6", "gs://bucket/replica/6.arc", "o1_mf_1_6.arc"));
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let stats = stage(storage.as_ref(), &replication, &catalog_store, "/scratch", |_, _| true)
            .await
            .unwrap();
        assert_eq!(stats.errors, 0);
        assert!(storage.hash("/scratch/o1_mf_1_5.arc").await.is_ok());
        assert!(storage.hash("/scratch/o1_mf_1_6.arc").await.is_ok());
    }

    #[tokio::test]
    async fn gap_in_the_requested_range_fails_before_any_copy() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let replication = ReplicationGroup::new(storage.clone(), Arc::new(hash_store), 2);

        seed_replica(&storage, "gs://bucket/replica/5.arc", b"five").await;
        seed_replica(&storage, "gs://bucket/replica/6.arc", b"six").await;
        seed_replica(&storage, "gs://bucket/replica/7.arc", b"seven").await;

        let mut catalog = LogMetadata::new();
        catalog.insert(composite_key("1", "2", "5"), entry("5", "gs://bucket/replica/5.arc", "5.arc"));
        catalog.insert(composite_key("1", "2", "6"), entry("6", "gs://bucket/replica/6.arc", "6.arc"));
        catalog.insert(composite_key("1", "2", "7"), entry("7", "gs://bucket/replica/7.arc", "7.arc"));
        catalog.insert(composite_key("1", "2", "8"), entry("8", "", "8.arc"));
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let wanted = ["5", "6", "7", "8"];
        let err = stage(storage.as_ref(), &replication, &catalog_store, "/scratch", |_, e| {
            wanted.contains(&e.sequence.as_str())
        })
        .await
        .unwrap_err();

        match err {
            Error::StageGap(keys) => assert_eq!(keys, vec![composite_key("1", "2", "8")]),
            other => panic!("expected StageGap, got {other:?}"),
        }
        assert!(storage.hash("/scratch/5.arc").await.is_err());
    }

    #[tokio::test]
    async fn copy_failure_is_reported_as_a_replication_failure() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let replication = ReplicationGroup::new(storage.clone(), Arc::new(hash_store), 2);

        let mut catalog = LogMetadata::new();
        catalog.insert(composite_key("1", "2", "5"), entry("5", "gs://bucket/replica/missing.arc", "o1_mf_1_5.arc"));
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let err = stage(storage.as_ref(), &replication, &catalog_store, "/scratch", |_, _| true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Replication { failures: 1, .. }));
    }

    #[tokio::test]
    async fn empty_catalog_fails_immediately() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let replication = ReplicationGroup::new(storage.clone(), Arc::new(hash_store), 1);

        let err = stage(storage.as_ref(), &replication, &catalog_store, "/scratch", |_, _| true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyCatalog));
    }
}
