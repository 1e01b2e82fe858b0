use pitr_storage::Storage;
use tracing::debug;

use crate::error::Result;

/// Streams `src` to `dest` end-to-end, logging throughput. Returns the
/// number of bytes copied.
pub(crate) async fn copy_bytes(storage: &dyn Storage, src: &str, dest: &str) -> Result<u64> {
    let started = std::time::Instant::now();
    let mut reader = storage.read(src).await?;
    let mut writer = storage.write(dest).await?;
    let bytes = tokio::io::copy(&mut reader, &mut writer).await.map_err(|e| {
        pitr_storage::Error::TransientIo {
            path: src.to_string(),
            source: e,
        }
    })?;
    writer.commit().await?;

    let elapsed = started.elapsed();
    let mib_per_sec = if elapsed.as_secs_f64() > 0.0 {
        (bytes as f64 / 1024.0 / 1024.0) / elapsed.as_secs_f64()
    } else {
        0.0
    };
    debug!(src = %src, dest = %dest, bytes, mib_per_sec, "copied archived log");
    Ok(bytes)
}
