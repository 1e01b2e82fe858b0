//! The catalog update cycle: resolves the archive directory, queries the
//! archived-log view, and merges the rows with hash-store entries into the
//! durable catalog. Replication fields are never overwritten once set —
//! the entry is "frozen" the moment it gets a non-empty `replica_path`.

use chrono::{DateTime, Duration, Utc};
use pitr_db::{column, ArchiveDirCache, DbQuery, Queries, Row};
use pitr_kv::{LogHashEntry, SimpleStore, StoreLock};
use pitr_storage::Crc32cHash;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{composite_key, LogMetadata, LogMetadataEntry};
use crate::retention::CATALOG_KEY;

/// How far back the archived-log view is queried on every cycle.
const LOOKBACK_DAYS: i64 = 30;

/// Local retry budget for a corrupt prior catalog before falling back to an
/// empty one. Retries are intentionally bare, no backoff: a decode failure
/// is not expected to heal between attempts, this mirrors the coarse retry
/// the rest of the engine relies on (whole-cycle retry, not per-operation).
const CATALOG_READ_RETRIES: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateStats {
    pub rows_seen: usize,
    pub entries_written: usize,
}

/// Runs one catalog-update cycle.
pub async fn update_cycle(
    db: &dyn DbQuery,
    queries: &Queries,
    archive_dir: &ArchiveDirCache,
    catalog_store: &SimpleStore,
    hash_store: &SimpleStore,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<UpdateStats> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let dir = archive_dir.get_or_query(db, queries).await?;
    let since = now - Duration::days(LOOKBACK_DAYS);
    let sql = queries.archived_log_sql(&dir, &since.to_rfc3339());
    let rows = db.run_formatted(&sql).await?;

    let lock = catalog_store.lock().await;
    let mut catalog = read_catalog_with_retries(catalog_store, &lock).await;

    let mut written = 0usize;
    let mut cancelled = false;
    for row in &rows {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        match apply_row(row, &mut catalog, hash_store).await {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => warn!(error = %e, "skipping unparseable archived-log row"),
        }
    }

    catalog_store.write(&lock, CATALOG_KEY, &catalog).await?;
    if cancelled {
        return Err(Error::Cancelled);
    }
    Ok(UpdateStats {
        rows_seen: rows.len(),
        entries_written: written,
    })
}

/// Applies one archived-log row to `catalog`, joining in the hash store.
/// Returns `Ok(true)` if a new or promoted entry was written, `Ok(false)` if
/// the row was a no-op because its key is already frozen (non-empty
/// `replica_path`), and `Err` if the row could not be parsed.
async fn apply_row(row: &Row, catalog: &mut LogMetadata, hash_store: &SimpleStore) -> Result<bool> {
    let thread = column(row, "THREAD#")?;
    let incarnation = column(row, "INCARNATION#")?;
    let sequence = column(row, "SEQUENCE#")?;
    let key = composite_key(thread, incarnation, sequence);

    if catalog.get(&key).is_some_and(|e| e.is_replicated()) {
        debug!(key, "catalog entry already replicated, skipping row");
        return Ok(false);
    }

    let src_path = column(row, "NAME")?.to_string();
    let first_change = column(row, "FIRST_CHANGE#")?.to_string();
    let next_change = column(row, "NEXT_CHANGE#")?.to_string();
    let completion_time = column(row, "COMPLETION_TIME")?.to_string();
    let first_time = parse_rfc3339(column(row, "FIRST_TIME")?)?;
    let next_time = parse_rfc3339(column(row, "NEXT_TIME")?)?;

    let hash = join_hash_store(hash_store, &src_path, first_time).await;

    catalog.insert(
        key,
        LogMetadataEntry {
            hash,
            src_path,
            first_change,
            next_change,
            first_time,
            next_time,
            completion_time,
            sequence: sequence.to_string(),
            incarnation: incarnation.to_string(),
            thread: thread.to_string(),
        },
    );
    Ok(true)
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidRow(format!("bad timestamp {s:?}: {e}")))
}

/// Joins in the hash-store entry for `src_path` under the hash-store's own
/// lock, held only for the duration of this one read. If the source has not
/// been replicated yet, a fresh unreplicated entry is constructed instead —
/// it will be promoted once the replication group catches up.
async fn join_hash_store(hash_store: &SimpleStore, src_path: &str, first_time: DateTime<Utc>) -> LogHashEntry {
    let lock = hash_store.lock().await;
    let result = hash_store.read(&lock, src_path).await;
    drop(lock);

    result.unwrap_or(LogHashEntry {
        crc32c_hash: Crc32cHash::ZERO,
        replica_path: String::new(),
        mod_time: first_time,
    })
}

async fn read_catalog_with_retries(store: &SimpleStore, lock: &StoreLock<'_>) -> LogMetadata {
    for attempt in 1..=CATALOG_READ_RETRIES {
        match store.read(lock, CATALOG_KEY).await {
            Ok(catalog) => return catalog,
            Err(e) if e.is_not_found() => return LogMetadata::new(),
            Err(e) => debug!(attempt, error = %e, "failed to decode prior catalog, retrying"),
        }
    }
    warn!(
        attempts = CATALOG_READ_RETRIES,
        "catalog still undecodable after retries, proceeding with an empty catalog"
    );
    LogMetadata::new()
}
