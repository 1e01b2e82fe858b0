//! Retention sweep: evicts catalog entries (and their replicas)
//! once their logical time range falls before the retention window.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pitr_kv::SimpleStore;
use pitr_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::LogMetadata;

pub const CATALOG_KEY: &str = "catalog";

/// `E = floor_to_day(now - retentionDays)`.
pub fn expiration(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    let cutoff = now - Duration::days(retention_days);
    let day = cutoff.date_naive();
    DateTime::<Utc>::from_naive_utc_and_offset(day.and_hms_opt(0, 0, 0).expect("midnight is always valid"), Utc)
}

/// Parses the `YYYY_MM_DD` directory name that is the immediate parent of a
/// replica path's basename, e.g. `gs://b/arch/2021_09_01/x.arc` -> `2021-09-01`.
fn parent_date(replica_path: &str) -> Option<NaiveDate> {
    let trimmed = replica_path.trim_end_matches('/');
    let (rest, _basename) = trimmed.rsplit_once('/')?;
    let (_, dir) = rest.rsplit_once('/').unwrap_or(("", rest));
    NaiveDate::parse_from_str(dir, "%Y_%m_%d").ok()
}

/// Runs one sweep: reads the catalog under `catalog_store`'s lock, deletes
/// expired entries' replicas and hash-store entries, and writes the reduced
/// catalog back before releasing the lock.
///
/// The catalog lock is held for the whole sweep, including remote deletes.
/// Simpler than re-reading the catalog around each delete, at the cost of
/// serializing cleanup against concurrent catalog updates.
pub async fn sweep(
    storage: &dyn Storage,
    catalog_store: &SimpleStore,
    hash_store: &SimpleStore,
    now: DateTime<Utc>,
    retention_days: i64,
    cancel: &CancellationToken,
) -> Result<usize> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let expiration = expiration(now, retention_days);
    let catalog_lock = catalog_store.lock().await;
    let mut catalog: LogMetadata = match catalog_store.read(&catalog_lock, CATALOG_KEY).await {
        Ok(c) => c,
        Err(e) if e.is_not_found() => LogMetadata::new(),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = 0usize;
    let mut cancelled = false;
    let expired_keys: Vec<String> = catalog
        .iter()
        .filter(|(_, e)| e.next_time < expiration)
        .map(|(k, _)| k.clone())
        .collect();

    for key in expired_keys {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let replica_path = catalog[&key].hash.replica_path.clone();
        let Some(date) = parent_date(&replica_path) else {
            debug!(key, replica_path, "retention: replica path has no parseable date, skipping deletion");
            continue;
        };
        if date >= expiration.date_naive() {
            debug!(key, %date, "retention: parsed date is not before expiration, skipping deletion");
            continue;
        }
        if let Err(e) = storage.delete(&replica_path, true).await {
            warn!(key, replica_path, error = %e, "retention: failed to delete replica, preserving catalog entry");
            continue;
        }

        let hash_lock = hash_store.lock().await;
        let src_path = catalog[&key].src_path.clone();
        if let Err(e) = hash_store.delete(&hash_lock, &src_path).await {
            warn!(key, src_path, error = %e, "retention: failed to delete hash-store entry");
        }
        drop(hash_lock);

        catalog.remove(&key);
        deleted += 1;
    }

    catalog_store.write(&catalog_lock, CATALOG_KEY, &catalog).await?;
    if cancelled {
        return Err(Error::Cancelled);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{composite_key, LogMetadataEntry};
    use chrono::TimeZone;
    use pitr_kv::LogHashEntry;
    use pitr_storage::{mem::MemStorage, Crc32cHash};
    use std::sync::Arc;

    fn entry(next_time: DateTime<Utc>, replica_path: &str) -> LogMetadataEntry {
        LogMetadataEntry {
            hash: LogHashEntry {
                crc32c_hash: Crc32cHash::ZERO,
                replica_path: replica_path.to_string(),
                mod_time: next_time,
            },
            src_path: format!("/arch/{replica_path}"),
            first_change: "1".to_string(),
            next_change: "2".to_string(),
            first_time: next_time,
            next_time,
            completion_time: next_time.to_rfc3339(),
            sequence: "1".to_string(),
            incarnation: "2".to_string(),
            thread: "1".to_string(),
        }
    }

    #[test]
    fn parent_date_parses_yyyy_mm_dd_directory() {
        assert_eq!(
            parent_date("gs://pitr/archivelog/2021_09_01/x.arc"),
            Some(NaiveDate::from_ymd_opt(2021, 9, 1).unwrap())
        );
    }

    #[test]
    fn parent_date_rejects_unexpected_parent() {
        assert_eq!(parent_date("gs://pitr/archivelog/x.arc"), None);
    }

    #[tokio::test]
    async fn cleanup_one_expired_log() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());

        let mut w = storage.write("gs://pitr/archivelog/2021_09_01/x.arc").await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut w, b"x").await.unwrap();
        w.commit().await.unwrap();
        let mut w = storage.write("gs://pitr/archivelog/2021_09_02/y.arc").await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut w, b"y").await.unwrap();
        w.commit().await.unwrap();

        let mut catalog = LogMetadata::new();
        let e1 = entry(Utc.with_ymd_and_hms(2021, 9, 1, 1, 0, 0).unwrap(), "gs://pitr/archivelog/2021_09_01/x.arc");
        let e2 = entry(Utc.with_ymd_and_hms(2021, 9, 2, 2, 0, 0).unwrap(), "gs://pitr/archivelog/2021_09_02/y.arc");
        catalog.insert(composite_key("1", "2", "1"), e1);
        catalog.insert(composite_key("1", "2", "2"), e2);
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let now = Utc.with_ymd_and_hms(2021, 9, 3, 12, 0, 0).unwrap();
        let deleted = sweep(storage.as_ref(), &catalog_store, &hash_store, now, 1, &CancellationToken::new()).await.unwrap();
        assert_eq!(deleted, 1);

        let lock = catalog_store.lock().await;
        let after: LogMetadata = catalog_store.read(&lock, CATALOG_KEY).await.unwrap();
        assert!(!after.contains_key(&composite_key("1", "2", "1")));
        assert!(after.contains_key(&composite_key("1", "2", "2")));
        assert!(storage.hash("gs://pitr/archivelog/2021_09_01/x.arc").await.is_err());
    }

    #[tokio::test]
    async fn skip_delete_on_unexpected_path() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());

        let mut w = storage.write("gs://pitr/archivelog/x.arc").await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut w, b"x").await.unwrap();
        w.commit().await.unwrap();

        let mut catalog = LogMetadata::new();
        let e1 = entry(Utc.with_ymd_and_hms(2021, 8, 30, 1, 0, 0).unwrap(), "gs://pitr/archivelog/x.arc");
        catalog.insert(composite_key("1", "2", "1"), e1);
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let now = Utc.with_ymd_and_hms(2021, 9, 3, 12, 0, 0).unwrap();
        let deleted = sweep(storage.as_ref(), &catalog_store, &hash_store, now, 2, &CancellationToken::new()).await.unwrap();
        assert_eq!(deleted, 0);

        let lock = catalog_store.lock().await;
        let after: LogMetadata = catalog_store.read(&lock, CATALOG_KEY).await.unwrap();
        assert!(after.contains_key(&composite_key("1", "2", "1")));
        assert!(storage.hash("gs://pitr/archivelog/x.arc").await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_sweep_before_any_delete() {
        let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
        let catalog_store = SimpleStore::new(storage.clone(), "data/".to_string());
        let hash_store = SimpleStore::new(storage.clone(), "data/".to_string());

        let mut w = storage.write("gs://pitr/archivelog/2021_09_01/x.arc").await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut w, b"x").await.unwrap();
        w.commit().await.unwrap();

        let mut catalog = LogMetadata::new();
        let e1 = entry(Utc.with_ymd_and_hms(2021, 9, 1, 1, 0, 0).unwrap(), "gs://pitr/archivelog/2021_09_01/x.arc");
        catalog.insert(composite_key("1", "2", "1"), e1);
        let lock = catalog_store.lock().await;
        catalog_store.write(&lock, CATALOG_KEY, &catalog).await.unwrap();
        drop(lock);

        let now = Utc.with_ymd_and_hms(2021, 9, 3, 12, 0, 0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sweep(storage.as_ref(), &catalog_store, &hash_store, now, 1, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(storage.hash("gs://pitr/archivelog/2021_09_01/x.arc").await.is_ok());
    }
}
