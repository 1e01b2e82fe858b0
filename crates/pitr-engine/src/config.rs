//! Engine-wide configuration, mirroring the §6 configuration table verbatim.
//!
//! Durations are stored as whole seconds on the wire (rather than
//! `std::time::Duration`, which has no native `serde` representation) so a
//! caller can load this straight from a CRD spec or config file; [`PitrConfig::sync_interval`]
//! and friends convert to `Duration` at the point of use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Period of the log-syncer and catalog-update loops. Default: 60s.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
/// Per-cycle hard deadline for the log syncer. Default: 3600s.
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 3600;
/// Period of the retention loop. Default: 86400s (24h).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 86400;
/// Replication-group parallelism. Default: 4.
pub const DEFAULT_REPLICATION_THREAD_COUNT: usize = 4;
/// Days to keep replicated logs and catalog entries. Always caller-supplied
/// in production; the `Default` impl picks a conservative placeholder so a
/// config missing this field fails loudly in integration rather than
/// silently deleting everything on the first sweep.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitrConfig {
    pub sync_interval_secs: u64,
    pub sync_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub replication_thread_count: usize,
    pub retention_days: i64,
    /// Base directory for the catalog and hash-store records. Must end in
    /// `/`; see [`pitr_kv::SimpleStore::new`].
    pub data_dir: String,
    /// Root under which replicated logs are mirrored, e.g. `gs://bucket/arch`.
    pub dest_dir: String,
}

impl Default for PitrConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            replication_thread_count: DEFAULT_REPLICATION_THREAD_COUNT,
            retention_days: DEFAULT_RETENTION_DAYS,
            data_dir: String::new(),
            dest_dir: String::new(),
        }
    }
}

impl PitrConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_configuration_table() {
        let c = PitrConfig::default();
        assert_eq!(c.sync_interval(), Duration::from_secs(60));
        assert_eq!(c.sync_timeout(), Duration::from_secs(3600));
        assert_eq!(c.cleanup_interval(), Duration::from_secs(86400));
        assert_eq!(c.replication_thread_count, 4);
    }

    #[test]
    fn roundtrips_through_json() {
        let c = PitrConfig {
            data_dir: "data/".to_string(),
            dest_dir: "gs://bucket/arch".to_string(),
            retention_days: 14,
            ..Default::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: PitrConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retention_days, 14);
        assert_eq!(back.data_dir, "data/");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let c: PitrConfig = serde_json::from_str(r#"{"retention_days": 30}"#).unwrap();
        assert_eq!(c.retention_days, 30);
        assert_eq!(c.replication_thread_count, DEFAULT_REPLICATION_THREAD_COUNT);
    }
}
