use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::hash::{Crc32cHash, Hasher};
use crate::write_handle::WriteHandle;

const TMP_SUFFIX: &str = ".pitr-tmp";

/// Stream the file at `path` and compute its CRC32C. Local blobs have no
/// out-of-band checksum metadata, so this always reads the body.
pub(crate) async fn hash(path: &Path) -> Result<Crc32cHash> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io(path.display().to_string(), e))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

pub(crate) async fn mtime(path: &Path) -> Result<SystemTime> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::io(path.display().to_string(), e))?;
    meta.modified().map_err(|e| Error::io(path.display().to_string(), e))
}

pub(crate) async fn mkdirp(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io(path.display().to_string(), e))
}

pub(crate) async fn open_read(path: &Path) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io(path.display().to_string(), e))?;
    Ok(Box::new(file))
}

/// Open a write handle for `path`. Bytes land in a sibling temp file first;
/// [`WriteHandle::commit`] renames it into place so a reader never observes a
/// partially-written blob.
pub(crate) async fn open_write(path: &Path) -> Result<WriteHandle> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent.display().to_string(), e))?;
    }
    let mut tmp_path: PathBuf = path.as_os_str().into();
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(format!("{TMP_SUFFIX}.{}", std::process::id()));
    tmp_path.set_file_name(tmp_name);

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .await
        .map_err(|e| Error::io(tmp_path.display().to_string(), e))?;
    Ok(WriteHandle::Local {
        file,
        tmp_path,
        final_path: path.to_path_buf(),
    })
}

pub(crate) async fn delete(path: &Path, ignore_not_found: bool) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && ignore_not_found => Ok(()),
        Err(e) => Err(Error::io(path.display().to_string(), e)),
    }
}
