use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] pitr_storage::Error),

    #[error(transparent)]
    Db(#[from] pitr_db::Error),

    /// The cycle's hard deadline elapsed before the walk and replication
    /// finished draining.
    #[error("sync cycle exceeded its deadline")]
    Deadline,

    /// Per-file failures are counted rather than surfaced individually;
    /// a non-zero count at the end of a cycle becomes this one error.
    #[error("{op} cycle had {failures} file failure(s)")]
    Replication { op: &'static str, failures: u64 },

    /// The governing cancellation signal fired while this cycle was running.
    /// Not a failure: the outer loop's own cancellation branch is what
    /// actually stops it, this just lets a mid-cycle cancellation surface
    /// through `run_cycle`'s return value instead of silently reporting a
    /// truncated cycle as a success.
    #[error("sync cycle cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
