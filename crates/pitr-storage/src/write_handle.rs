use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use object_store::buffered::BufWriter as GcsBufWriter;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::mem::MemStorage;

/// A sequential write stream: closing it flushes and commits. There is no
/// implicit commit-on-drop — an uncommitted
/// handle that is simply dropped leaves no trace of a successful write,
/// which is what lets a crashed copy be safely retried.
pub enum WriteHandle {
    Local {
        file: tokio::fs::File,
        tmp_path: PathBuf,
        final_path: PathBuf,
    },
    Gcs(Box<GcsBufWriter>),
    Mem {
        store: MemStorage,
        path: String,
        buf: Vec<u8>,
    },
}

impl WriteHandle {
    pub(crate) fn mem(store: MemStorage, path: String) -> Self {
        WriteHandle::Mem {
            store,
            path,
            buf: Vec::new(),
        }
    }

    /// Flush and atomically publish the written bytes: rename-on-close for
    /// local files, single-object overwrite for object storage.
    pub async fn commit(self) -> Result<()> {
        match self {
            WriteHandle::Local {
                mut file,
                tmp_path,
                final_path,
            } => {
                file.flush().await.map_err(|e| Error::io(tmp_path.display().to_string(), e))?;
                file.sync_all().await.map_err(|e| Error::io(tmp_path.display().to_string(), e))?;
                drop(file);
                tokio::fs::rename(&tmp_path, &final_path)
                    .await
                    .map_err(|e| Error::io(final_path.display().to_string(), e))
            }
            WriteHandle::Gcs(mut w) => w.shutdown().await.map_err(|e| Error::io("gs://", e)),
            WriteHandle::Mem { store, path, buf } => {
                crate::mem::publish(&store, path, buf);
                Ok(())
            }
        }
    }
}

impl AsyncWrite for WriteHandle {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            WriteHandle::Local { file, .. } => Pin::new(file).poll_write(cx, buf),
            WriteHandle::Gcs(w) => Pin::new(w.as_mut()).poll_write(cx, buf),
            WriteHandle::Mem { buf: dst, .. } => {
                dst.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteHandle::Local { file, .. } => Pin::new(file).poll_flush(cx),
            WriteHandle::Gcs(w) => Pin::new(w.as_mut()).poll_flush(cx),
            WriteHandle::Mem { .. } => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteHandle::Local { file, .. } => Pin::new(file).poll_shutdown(cx),
            WriteHandle::Gcs(w) => Pin::new(w.as_mut()).poll_shutdown(cx),
            WriteHandle::Mem { .. } => Poll::Ready(Ok(())),
        }
    }
}
