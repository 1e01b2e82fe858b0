use thiserror::Error;

/// Errors produced by the [`crate::Storage`] abstraction.
///
/// Every storage operation fails with exactly one of these kinds; callers
/// match on variants rather than inspecting opaque I/O errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A retryable I/O failure (network blip, temporary permission denial,
    /// disk pressure). The next cycle is expected to retry the whole
    /// operation; this crate never retries internally.
    #[error("transient I/O error on {path}: {source}")]
    TransientIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The target blob does not exist. Callers that treat a missing target
    /// as success (idempotent deletes) must check for this variant
    /// themselves; `delete(.., ignore_not_found = true)` already does so.
    #[error("not found: {0}")]
    NotFound(String),

    /// Source and destination checksums disagreed after a copy.
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// `path` could not be parsed as either a `gs://bucket/...` URL or a
    /// local filesystem path (e.g. `gs://` with fewer than two characters
    /// of bucket name before the next `/`).
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The backend for this bucket could not be constructed (e.g. missing
    /// environment credentials). Distinct from `TransientIo` because retrying
    /// without fixing configuration will not help.
    #[error("failed to initialize object store backend for bucket {bucket}: {source}")]
    BackendInit {
        bucket: String,
        #[source]
        source: object_store::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(source.to_string())
        } else {
            Error::TransientIo {
                path: String::new(),
                source,
            }
        }
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.into())
        } else {
            Error::TransientIo {
                path: path.into(),
                source,
            }
        }
    }

    pub(crate) fn object_store(path: impl Into<String>, source: object_store::Error) -> Self {
        match source {
            object_store::Error::NotFound { .. } => Error::NotFound(path.into()),
            other => Error::TransientIo {
                path: path.into(),
                source: std::io::Error::other(other),
            },
        }
    }

    /// True if this error represents a target that was already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
