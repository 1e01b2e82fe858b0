use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] pitr_storage::Error),
    #[error(transparent)]
    Kv(#[from] pitr_kv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
