use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use crate::error::{Error, Result};
use crate::hash::{Crc32cHash, Hasher};
use crate::write_handle::WriteHandle;

/// GCS stores CRC32C natively as object metadata in the provider's own JSON
/// API, but the generic [`object_store`] crate does not surface it. We keep
/// a sidecar object recording the hash of every blob this engine writes, so
/// that repeat `hash()` calls (retention, invariant checks) are metadata-only
/// reads rather than full-body streams. The first `hash()` of a blob this
/// engine did not itself write falls back to streaming and then backfills
/// the sidecar.
fn sidecar(key: &ObjectPath) -> ObjectPath {
    ObjectPath::from(format!("{key}.crc32c"))
}

pub(crate) async fn hash(store: &Arc<dyn ObjectStore>, key: &ObjectPath) -> Result<Crc32cHash> {
    if let Ok(got) = store.get(&sidecar(key)).await {
        if let Ok(bytes) = got.bytes().await {
            if let Some(h) = std::str::from_utf8(&bytes).ok().and_then(Crc32cHash::from_base64) {
                return Ok(h);
            }
        }
    }

    let got = store.get(key).await.map_err(|e| Error::object_store(key.to_string(), e))?;
    let mut hasher = Hasher::new();
    let mut stream = got.into_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::object_store(key.to_string(), e))?;
        hasher.update(&chunk);
    }
    let h = hasher.finish();
    // Best-effort: a failure to write the sidecar just means the next
    // `hash()` call falls back to streaming again.
    let _ = store.put(&sidecar(key), h.to_base64().into_bytes().into()).await;
    Ok(h)
}

pub(crate) async fn mtime(store: &Arc<dyn ObjectStore>, key: &ObjectPath) -> Result<SystemTime> {
    let meta = store
        .head(key)
        .await
        .map_err(|e| Error::object_store(key.to_string(), e))?;
    let secs = meta.last_modified.timestamp().max(0) as u64;
    let nanos = meta.last_modified.timestamp_subsec_nanos();
    Ok(SystemTime::UNIX_EPOCH + Duration::new(secs, nanos))
}

/// No-op: object stores have no directory concept.
pub(crate) fn mkdirp() -> Result<()> {
    Ok(())
}

pub(crate) async fn open_read(
    store: Arc<dyn ObjectStore>,
    key: ObjectPath,
) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
    let got = store
        .get(&key)
        .await
        .map_err(|e| Error::object_store(key.to_string(), e))?;
    let stream = got
        .into_stream()
        .map(|r| r.map_err(|e| std::io::Error::other(e.to_string())));
    Ok(Box::new(tokio_util::io::StreamReader::new(stream)))
}

pub(crate) fn open_write(store: Arc<dyn ObjectStore>, key: ObjectPath) -> WriteHandle {
    WriteHandle::Gcs(Box::new(object_store::buffered::BufWriter::new(store, key)))
}

pub(crate) async fn delete(store: &Arc<dyn ObjectStore>, key: &ObjectPath, ignore_not_found: bool) -> Result<()> {
    match store.delete(key).await {
        Ok(()) => {
            let _ = store.delete(&sidecar(key)).await;
            Ok(())
        }
        Err(object_store::Error::NotFound { .. }) if ignore_not_found => Ok(()),
        Err(e) => Err(Error::object_store(key.to_string(), e)),
    }
}
