//! The Catalog's data model: `LogMetadataEntry` describes one archived
//! log physically (hash, replica) and logically (SCN/time range); `LogMetadata`
//! is the whole catalog, keyed by `"<thread>-<incarnation>-<sequence>"`.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use pitr_kv::{LogHashEntry, Record};
use serde::{Deserialize, Serialize};

/// One archived log, described both physically (where it came from, where
/// its replica is, hash) and logically (what SCN/time range it covers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetadataEntry {
    pub hash: LogHashEntry,
    pub src_path: String,
    pub first_change: String,
    pub next_change: String,
    pub first_time: DateTime<Utc>,
    pub next_time: DateTime<Utc>,
    pub completion_time: String,
    pub sequence: String,
    pub incarnation: String,
    pub thread: String,
}

impl LogMetadataEntry {
    pub fn is_replicated(&self) -> bool {
        self.hash.is_replicated()
    }
}

/// The composite key uniquely identifying one archived log within one
/// database lineage.
pub fn composite_key(thread: &str, incarnation: &str, sequence: &str) -> String {
    format!("{thread}-{incarnation}-{sequence}")
}

/// The whole catalog: a mapping from composite key to [`LogMetadataEntry`].
///
/// Wrapped in a newtype (rather than a bare `HashMap` alias) so it can
/// implement [`Record`] locally — Rust's orphan rule forbids implementing a
/// foreign trait for a foreign container type directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogMetadata(pub HashMap<String, LogMetadataEntry>);

impl LogMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Record for LogMetadata {
    const TAG: u8 = 2;
}

impl Deref for LogMetadata {
    type Target = HashMap<String, LogMetadataEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for LogMetadata {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitr_storage::Crc32cHash;

    fn entry(replica_path: &str, first_time: DateTime<Utc>, next_time: DateTime<Utc>) -> LogMetadataEntry {
        LogMetadataEntry {
            hash: LogHashEntry {
                crc32c_hash: Crc32cHash::ZERO,
                replica_path: replica_path.to_string(),
                mod_time: first_time,
            },
            src_path: "/arch/o1.arc".to_string(),
            first_change: "100".to_string(),
            next_change: "200".to_string(),
            first_time,
            next_time,
            completion_time: first_time.to_rfc3339(),
            sequence: "1".to_string(),
            incarnation: "2".to_string(),
            thread: "1".to_string(),
        }
    }

    #[test]
    fn composite_key_formats_thread_incarnation_sequence() {
        assert_eq!(composite_key("1", "2", "3"), "1-2-3");
    }

    #[test]
    fn is_replicated_delegates_to_embedded_hash_entry() {
        let now = Utc::now();
        let e = entry("", now, now);
        assert!(!e.is_replicated());
        let e = entry("gs://b/k", now, now);
        assert!(e.is_replicated());
    }
}
