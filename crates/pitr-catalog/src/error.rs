use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] pitr_storage::Error),

    #[error(transparent)]
    Kv(#[from] pitr_kv::Error),

    #[error(transparent)]
    Db(#[from] pitr_db::Error),

    /// A row returned by the archived-log view could not be turned into a
    /// catalog entry (e.g. an unparseable timestamp). The row is skipped,
    /// not fatal to the cycle; callers of `update_cycle` never see this
    /// directly, it is only logged.
    #[error("invalid archived-log row: {0}")]
    InvalidRow(String),

    /// Staging was asked to include entries that have no `replica_path` yet.
    /// Carries the composite keys of the gaps so the caller can report them.
    #[error("stage would be incomplete: {} entries have no replica yet: {}", .0.len(), .0.join(", "))]
    StageGap(Vec<String>),

    /// The catalog has no entries at all; there is nothing to stage.
    #[error("catalog is empty, nothing to stage")]
    EmptyCatalog,

    /// Per-file failures are counted rather than surfaced individually;
    /// a non-zero count at the end of a cycle becomes this one error.
    #[error("{op} cycle had {failures} file failure(s)")]
    Replication { op: &'static str, failures: u64 },

    /// The governing cancellation signal fired while this cycle was running.
    /// Not a failure: the outer loop's own cancellation branch is what
    /// actually stops it, this just lets a mid-cycle cancellation surface
    /// through the cycle's return value instead of silently reporting
    /// truncated progress as a success.
    #[error("catalog cycle cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
