use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] pitr_storage::Error),

    #[error("failed to decode record at key {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("failed to encode record for key {key}: {reason}")]
    Encode { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_not_found())
    }
}
