//! Prometheus metrics for the engine's long-running cycles.
//!
//! Exporting these over HTTP is out of scope (owned by the Prometheus
//! exporter, per spec §1); this module only increments/observes them. No
//! `metrics_group!`-style macro is used here — plain `prometheus` statics,
//! registered into a private [`Registry`] a caller can merge into its own.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static SYNC_FILES_COPIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pitr_sync_files_copied_total", "Archived logs successfully replicated by the log syncer").unwrap()
});

pub static SYNC_FILE_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("pitr_sync_file_errors_total", "Per-file copy failures in sync cycles").unwrap());

pub static SYNC_BYTES_COPIED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("pitr_sync_bytes_copied_total", "Bytes shipped to the replica store").unwrap());

pub static SYNC_CYCLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "pitr_sync_cycle_duration_seconds",
        "Wall-clock duration of one log-syncer cycle",
    ))
    .unwrap()
});

pub static CATALOG_SIZE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("pitr_catalog_entries", "Number of entries currently in the log catalog").unwrap());

pub static CATALOG_ROWS_SEEN: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("pitr_catalog_rows_seen_total", "Archived-log view rows seen by catalog cycles").unwrap());

pub static RETENTION_DELETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitr_retention_deletions_total", "Catalog entries evicted by retention sweeps"),
        &["outcome"],
    )
    .unwrap()
});

/// Registers every metric above into [`REGISTRY`]. Idempotent: a second call
/// is a harmless no-op because the metrics are already present (registration
/// failure on duplicate descriptors is ignored).
pub fn register() {
    let _ = REGISTRY.register(Box::new(SYNC_FILES_COPIED.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_FILE_ERRORS.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_BYTES_COPIED.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_CYCLE_DURATION.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_SIZE.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ROWS_SEEN.clone()));
    let _ = REGISTRY.register(Box::new(RETENTION_DELETIONS.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    // Statics (and the registry they live in) are process-wide, so these
    // tests only assert shape, not exact values: other tests in this binary
    // may drive real cycles concurrently and increment the same counters.
    #[test]
    fn register_is_idempotent() {
        register();
        register();
        assert!(REGISTRY.gather().iter().any(|mf| mf.name() == "pitr_sync_files_copied_total"));
    }

    #[test]
    fn retention_deletions_is_labeled_by_outcome() {
        RETENTION_DELETIONS.with_label_values(&["deleted"]).inc();
        assert!(RETENTION_DELETIONS.with_label_values(&["deleted"]).get() >= 1);
    }
}
