//! The Storage Abstraction: a uniform capability
//! for reading, writing, hashing, stamping, listing, and deleting blobs in
//! either a local filesystem or a remote object store, selected by URL
//! scheme.
//!
//! A single [`BlobStore`] handles both; callers never construct a backend
//! themselves, they just pass paths (`/local/path` or `gs://bucket/key`)
//! to its methods.

mod error;
mod gcs;
mod hash;
mod local;
mod location;
pub mod mem;
mod write_handle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::sync::RwLock;

pub use error::{Error, Result};
pub use hash::{Crc32cHash, Hasher};
pub use location::Location;
pub use write_handle::WriteHandle;

/// Constructs an [`ObjectStore`] client for a given bucket name.
///
/// This engine does not negotiate authentication itself; the default
/// factory defers to `object_store`'s "from environment"
/// discovery (the conventional `GOOGLE_APPLICATION_CREDENTIALS` flow). Tests
/// inject an in-memory factory instead.
pub type GcsClientFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn ObjectStore>> + Send + Sync>;

fn default_gcs_factory() -> GcsClientFactory {
    Arc::new(|bucket: &str| {
        GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map(|c| Arc::new(c) as Arc<dyn ObjectStore>)
            .map_err(|source| Error::BackendInit {
                bucket: bucket.to_string(),
                source,
            })
    })
}

/// Object-safe form of the Storage Abstraction, so that [`crate::BlobStore`]
/// and an in-memory test double ([`mem::MemStorage`]) can be swapped behind
/// `Arc<dyn Storage>` at the boundary of the replication, sync, and catalog
/// components.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn hash(&self, path: &str) -> Result<Crc32cHash>;
    async fn mtime(&self, path: &str) -> Result<SystemTime>;
    async fn mkdirp(&self, path: &str) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>>;
    async fn write(&self, path: &str) -> Result<WriteHandle>;
    async fn delete(&self, path: &str, ignore_not_found: bool) -> Result<()>;
    async fn close(&self);
}

#[async_trait::async_trait]
impl Storage for BlobStore {
    async fn hash(&self, path: &str) -> Result<Crc32cHash> {
        BlobStore::hash(self, path).await
    }

    async fn mtime(&self, path: &str) -> Result<SystemTime> {
        BlobStore::mtime(self, path).await
    }

    async fn mkdirp(&self, path: &str) -> Result<()> {
        BlobStore::mkdirp(self, path).await
    }

    async fn read(&self, path: &str) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        BlobStore::read(self, path).await
    }

    async fn write(&self, path: &str) -> Result<WriteHandle> {
        BlobStore::write(self, path).await
    }

    async fn delete(&self, path: &str, ignore_not_found: bool) -> Result<()> {
        BlobStore::delete(self, path, ignore_not_found).await
    }

    async fn close(&self) {
        BlobStore::close(self).await
    }
}

/// The Storage Abstraction, implemented uniformly over local files and
/// `gs://` object-store blobs.
pub struct BlobStore {
    gcs_factory: GcsClientFactory,
    gcs_clients: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore {
    pub fn new() -> Self {
        Self::with_gcs_factory(default_gcs_factory())
    }

    /// Construct a store with a caller-supplied GCS client factory, e.g. an
    /// in-memory `object_store::memory::InMemory` backend for tests.
    pub fn with_gcs_factory(gcs_factory: GcsClientFactory) -> Self {
        Self {
            gcs_factory,
            gcs_clients: RwLock::new(HashMap::new()),
        }
    }

    async fn gcs_client(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(client) = self.gcs_clients.read().await.get(bucket) {
            return Ok(client.clone());
        }
        let mut clients = self.gcs_clients.write().await;
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }
        let client = (self.gcs_factory)(bucket)?;
        clients.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    /// Returns the CRC32C of the blob at `path`.
    pub async fn hash(&self, path: &str) -> Result<Crc32cHash> {
        match Location::parse(path)? {
            Location::Local(p) => local::hash(&p).await,
            Location::Gcs { bucket, key } => {
                let client = self.gcs_client(&bucket).await?;
                gcs::hash(&client, &ObjectPath::from(key)).await
            }
        }
    }

    /// Returns the last-modification instant of the blob at `path`.
    pub async fn mtime(&self, path: &str) -> Result<SystemTime> {
        match Location::parse(path)? {
            Location::Local(p) => local::mtime(&p).await,
            Location::Gcs { bucket, key } => {
                let client = self.gcs_client(&bucket).await?;
                gcs::mtime(&client, &ObjectPath::from(key)).await
            }
        }
    }

    /// Creates `path` (and ancestors) as a directory. A no-op on object
    /// storage.
    pub async fn mkdirp(&self, path: &str) -> Result<()> {
        match Location::parse(path)? {
            Location::Local(p) => local::mkdirp(&p).await,
            Location::Gcs { .. } => gcs::mkdirp(),
        }
    }

    /// Opens a sequential read stream over the blob at `path`.
    pub async fn read(&self, path: &str) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        match Location::parse(path)? {
            Location::Local(p) => local::open_read(&p).await,
            Location::Gcs { bucket, key } => {
                let client = self.gcs_client(&bucket).await?;
                gcs::open_read(client, ObjectPath::from(key)).await
            }
        }
    }

    /// Opens a sequential write stream to `path`. The write is not durable
    /// until [`WriteHandle::commit`] returns `Ok`.
    pub async fn write(&self, path: &str) -> Result<WriteHandle> {
        match Location::parse(path)? {
            Location::Local(p) => local::open_write(&p).await,
            Location::Gcs { bucket, key } => {
                let client = self.gcs_client(&bucket).await?;
                Ok(gcs::open_write(client, ObjectPath::from(key)))
            }
        }
    }

    /// Removes the blob at `path`. If `ignore_not_found` is true, a missing
    /// target does not fail.
    pub async fn delete(&self, path: &str, ignore_not_found: bool) -> Result<()> {
        match Location::parse(path)? {
            Location::Local(p) => local::delete(&p, ignore_not_found).await,
            Location::Gcs { bucket, key } => {
                let client = self.gcs_client(&bucket).await?;
                gcs::delete(&client, &ObjectPath::from(key), ignore_not_found).await
            }
        }
    }

    /// Releases backing resources. [`BlobStore`] holds no connections that
    /// outlive a single call, so this only drops cached GCS clients.
    pub async fn close(&self) {
        self.gcs_clients.write().await.clear();
    }
}
