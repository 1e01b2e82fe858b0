//! The Simple Store: a typed key-value store over the Storage
//! Abstraction, parameterised by a base data directory.
//!
//! Callers serialize concurrent access themselves by holding a [`StoreLock`]
//! across a read-modify-write sequence; the store itself performs no
//! internal synchronization beyond handing out that lock. Giving the caller
//! control of the lock lets higher-level operations (e.g. "read-modify-write
//! the catalog") stay atomic against concurrent sync activity.

mod error;
mod record;

use std::sync::Arc;

use pitr_storage::Storage;
use tokio::sync::{Mutex, MutexGuard};

pub use error::{Error, Result};
pub use record::{LogHashEntry, Record};

/// Holds the Simple Store's exclusive critical section. Every [`SimpleStore`]
/// read/write/delete call requires a `&StoreLock` borrowed from here, so the
/// type system — not caller discipline alone — prevents unserialized access.
pub struct StoreLock<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

pub struct SimpleStore {
    storage: Arc<dyn Storage>,
    data_dir: String,
    crit: Mutex<()>,
}

impl SimpleStore {
    /// `data_dir` must end in `/`.
    pub fn new(storage: Arc<dyn Storage>, data_dir: impl Into<String>) -> Self {
        let data_dir = data_dir.into();
        debug_assert!(data_dir.ends_with('/'), "data_dir must end in '/': {data_dir}");
        Self {
            storage,
            data_dir,
            crit: Mutex::new(()),
        }
    }

    /// Acquire the store's exclusive critical section. Hold the returned
    /// guard across every read/write/delete in one logical transaction
    /// (e.g. "read-modify-write the catalog").
    pub async fn lock(&self) -> StoreLock<'_> {
        StoreLock(self.crit.lock().await)
    }

    fn path(&self, key: &str) -> String {
        format!("{}{key}", self.data_dir)
    }

    pub async fn read<T: Record>(&self, _lock: &StoreLock<'_>, key: &str) -> Result<T> {
        let path = self.path(key);
        let mut reader = self.storage.read(&path).await?;
        let mut bytes = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut bytes)
            .await
            .map_err(|e| Error::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        decode::<T>(key, &bytes)
    }

    pub async fn write<T: Record>(&self, _lock: &StoreLock<'_>, key: &str, value: &T) -> Result<()> {
        let path = self.path(key);
        let bytes = encode(key, value)?;
        let mut writer = self.storage.write(&path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut writer, &bytes)
            .await
            .map_err(|e| Error::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        writer.commit().await?;
        Ok(())
    }

    /// Idempotent with respect to missing keys.
    pub async fn delete(&self, _lock: &StoreLock<'_>, key: &str) -> Result<()> {
        let path = self.path(key);
        self.storage.delete(&path, true).await?;
        Ok(())
    }
}

fn encode<T: Record>(key: &str, value: &T) -> Result<Vec<u8>> {
    let mut out = vec![T::TAG];
    bincode::serialize_into(&mut out, value).map_err(|e| Error::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(out)
}

fn decode<T: Record>(key: &str, bytes: &[u8]) -> Result<T> {
    let (tag, body) = bytes.split_first().ok_or_else(|| Error::Decode {
        key: key.to_string(),
        reason: "empty record".to_string(),
    })?;
    if *tag != T::TAG {
        return Err(Error::Decode {
            key: key.to_string(),
            reason: format!("expected tag {} got {tag}", T::TAG),
        });
    }
    bincode::deserialize(body).map_err(|e| Error::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
