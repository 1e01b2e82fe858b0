//! The Database Query Interface: the one external collaborator the engine
//! talks SQL to. Specified here only as a contract — the actual
//! Oracle-daemon RPC transport is out of scope for this crate.

use std::collections::HashMap;

use thiserror::Error;

/// One row of a query result, name -> string value.
pub type Row = HashMap<String, String>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("database query failed: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Executes a single SQL statement and returns its rows.
///
/// The engine only ever issues the archived-log view, the recovery-file-dest
/// view, and the parameter view through this trait; it does not otherwise
/// interpret `sql`.
#[async_trait::async_trait]
pub trait DbQuery: Send + Sync {
    async fn run_formatted(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Looks up a column by name, treating an absent column as a query-shape
/// violation rather than a missing optional value.
pub fn column<'a>(row: &'a Row, name: &str) -> Result<&'a str> {
    row.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Query(format!("missing column {name}")))
}

/// The caller-supplied SQL text for the query shapes the engine needs. The
/// engine does not compose SQL itself beyond substituting `{dir}` / `{since}`
/// placeholders into `archived_log` — database dialect and authentication
/// are the caller's concern, not this crate's.
#[derive(Debug, Clone)]
pub struct Queries {
    /// Returns at least one row with column `NAME` (the current archive
    /// destination directory).
    pub recovery_dest: String,
    /// Template with `{dir}` and `{since}` placeholders, projecting
    /// `NAME, FIRST_CHANGE#, FIRST_TIME, NEXT_CHANGE#, NEXT_TIME, SEQUENCE#,
    /// COMPLETION_TIME, INCARNATION#, THREAD#`.
    pub archived_log: String,
    /// Returns a single row with column `VALUE` holding `archive_lag_target`.
    pub parameter_view: String,
    /// The one-shot nudge statement run when `archive_lag_target` is unset.
    pub archive_lag_alter: String,
}

impl Queries {
    pub fn archived_log_sql(&self, dir: &str, since_rfc3339: &str) -> String {
        self.archived_log.replace("{dir}", dir).replace("{since}", since_rfc3339)
    }
}

impl Default for Queries {
    fn default() -> Self {
        Self {
            recovery_dest: "select name as NAME from v$recovery_file_dest".to_string(),
            archived_log: "select al.name as NAME, al.first_change# as \"FIRST_CHANGE#\", \
                 al.first_time as FIRST_TIME, al.next_change# as \"NEXT_CHANGE#\", \
                 al.next_time as NEXT_TIME, al.sequence# as \"SEQUENCE#\", \
                 al.completion_time as COMPLETION_TIME, al.incarnation# as \"INCARNATION#\", \
                 al.thread# as \"THREAD#\" \
                 from v$archived_log al join v$database_incarnation inc \
                 on al.incarnation# = inc.incarnation# \
                 where al.completion_time >= '{since}' and al.name like '{dir}%'"
                .to_string(),
            parameter_view: "select value as VALUE from v$parameter where name='archive_lag_target'".to_string(),
            archive_lag_alter: "alter system set archive_lag_target=600 scope=both".to_string(),
        }
    }
}

/// Caches the database's current archive-log destination directory, shared
/// between the log syncer and the catalog update cycle. Both resolve the
/// directory the same way: return the cached value if present, otherwise
/// query `v$recovery_file_dest` and cache the result.
///
/// A successful cycle may invalidate the cache afterwards (the database can
/// rotate recovery destinations between cycles), so the next resolution
/// re-queries; a failed re-query just leaves the previous directory cached
/// for the next cycle to retry against.
pub struct ArchiveDirCache {
    cached: tokio::sync::Mutex<Option<String>>,
}

impl Default for ArchiveDirCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveDirCache {
    pub fn new() -> Self {
        Self {
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the cached directory, querying the database if there is none.
    pub async fn get_or_query(&self, db: &dyn DbQuery, queries: &Queries) -> Result<String> {
        if let Some(dir) = self.cached.lock().await.clone() {
            return Ok(dir);
        }
        let dir = query_archive_dir(db, queries).await?;
        *self.cached.lock().await = Some(dir.clone());
        Ok(dir)
    }

    /// Re-queries the database and updates the cache on success. On failure
    /// the prior cached directory (if any) is left untouched, so the current
    /// cycle's resolved directory stays valid for the next cycle.
    pub async fn refresh(&self, db: &dyn DbQuery, queries: &Queries) {
        match query_archive_dir(db, queries).await {
            Ok(dir) => *self.cached.lock().await = Some(dir),
            Err(e) => tracing::warn!(error = %e, "failed to refresh archive directory, keeping prior value"),
        }
    }
}

async fn query_archive_dir(db: &dyn DbQuery, queries: &Queries) -> Result<String> {
    let rows = db.run_formatted(&queries.recovery_dest).await?;
    let row = rows
        .first()
        .ok_or_else(|| Error::Query("v$recovery_file_dest returned no rows".to_string()))?;
    Ok(column(row, "NAME")?.to_string())
}


#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! An in-memory [`DbQuery`] double for use by `pitr-sync` and
    //! `pitr-catalog` tests, programmed with canned responses per SQL
    //! string (exact match).

    use super::*;
    use std::collections::HashMap as Map;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeDb {
        responses: Mutex<Map<String, Result<Vec<Row>>>>,
    }

    impl FakeDb {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn on(&self, sql: impl Into<String>, rows: Vec<Row>) {
            self.responses.lock().await.insert(sql.into(), Ok(rows));
        }

        pub async fn on_err(&self, sql: impl Into<String>, err: Error) {
            self.responses.lock().await.insert(sql.into(), Err(err));
        }
    }

    #[async_trait::async_trait]
    impl DbQuery for FakeDb {
        async fn run_formatted(&self, sql: &str) -> Result<Vec<Row>> {
            self.responses
                .lock()
                .await
                .get(sql)
                .cloned()
                .unwrap_or_else(|| Err(Error::Query(format!("no canned response for: {sql}"))))
        }
    }
}
