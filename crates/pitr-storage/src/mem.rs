//! An in-memory [`Storage`](crate::Storage) implementation for unit tests in
//! this crate and its dependents (`pitr-kv`, `pitr-replication`, `pitr-sync`,
//! `pitr-catalog`), so that those crates' tests never touch a real
//! filesystem or network.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::hash::Hasher;
use crate::write_handle::WriteHandle;
use crate::{Crc32cHash, Storage};

struct Entry {
    bytes: Vec<u8>,
    mtime: SystemTime,
}

type Table = Arc<Mutex<HashMap<String, Entry>>>;

/// A `HashMap`-backed blob store keyed by the exact path string passed in,
/// ignoring the `gs://` vs local distinction entirely (tests don't need the
/// scheme dispatch that [`crate::BlobStore`] performs).
#[derive(Default, Clone)]
pub struct MemStorage {
    entries: Table,
    clock: Arc<Mutex<Option<SystemTime>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the mtime assigned to subsequent writes, for deterministic
    /// "unchanged since last cycle" tests.
    pub fn set_clock(&self, at: SystemTime) {
        *self.clock.lock().unwrap() = Some(at);
    }

    fn now(&self) -> SystemTime {
        self.clock.lock().unwrap().unwrap_or_else(SystemTime::now)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    pub fn get_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(path).map(|e| e.bytes.clone())
    }

    fn publish(&self, path: String, bytes: Vec<u8>) {
        let mtime = self.now();
        self.entries.lock().unwrap().insert(path, Entry { bytes, mtime });
    }
}

#[async_trait::async_trait]
impl Storage for MemStorage {
    async fn hash(&self, path: &str) -> Result<Crc32cHash> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(path).ok_or_else(|| Error::NotFound(path.to_string()))?;
        let mut hasher = Hasher::new();
        hasher.update(&entry.bytes);
        Ok(hasher.finish())
    }

    async fn mtime(&self, path: &str) -> Result<SystemTime> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(path)
            .map(|e| e.mtime)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn mkdirp(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(path).ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(entry.bytes.clone())))
    }

    async fn write(&self, path: &str) -> Result<WriteHandle> {
        Ok(WriteHandle::mem(self.clone(), path.to_string()))
    }

    async fn delete(&self, path: &str, ignore_not_found: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(path).is_some() || ignore_not_found {
            Ok(())
        } else {
            Err(Error::NotFound(path.to_string()))
        }
    }

    async fn close(&self) {}
}

pub(crate) fn publish(store: &MemStorage, path: String, bytes: Vec<u8>) {
    store.publish(path, bytes);
}
