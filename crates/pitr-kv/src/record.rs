use chrono::{DateTime, Utc};
use pitr_storage::Crc32cHash;
use serde::{Deserialize, Serialize};

/// A value shape the Simple Store can persist.
///
/// The store deliberately does *not* accept an arbitrary `Serialize` value:
/// every record is tagged with a fixed byte on the wire (`TAG`), and `read`
/// rejects bytes tagged for a different record shape rather than silently
/// misinterpreting them.
pub trait Record: Serialize + for<'de> Deserialize<'de> {
    const TAG: u8;
}

/// Records that a specific source log has been successfully copied to
/// `replica_path`, and what its source looked like (mtime, content hash)
/// when that happened.
///
/// Keyed in the hash store by the source file's absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHashEntry {
    pub crc32c_hash: Crc32cHash,
    /// Empty until the first successful copy; never unset once non-empty
    /// except by retention.
    pub replica_path: String,
    pub mod_time: DateTime<Utc>,
}

impl LogHashEntry {
    pub fn is_replicated(&self) -> bool {
        !self.replica_path.is_empty()
    }
}

impl Record for LogHashEntry {
    const TAG: u8 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_replicated_reflects_replica_path() {
        let mut e = LogHashEntry {
            crc32c_hash: Crc32cHash::ZERO,
            replica_path: String::new(),
            mod_time: Utc::now(),
        };
        assert!(!e.is_replicated());
        e.replica_path = "gs://b/k".to_string();
        assert!(e.is_replicated());
    }
}
