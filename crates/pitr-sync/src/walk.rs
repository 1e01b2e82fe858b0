//! Recursive walk of a local source directory, feeding `(src, dest)` pairs
//! to a channel and `mkdirp`-ing the destination as directories are found.
//!
//! Written as an explicit stack rather than async recursion, since a
//! `Future`-returning function cannot call itself without boxing.

use std::path::{Path, PathBuf};

use pitr_replication::CopyJob;
use pitr_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    pub files_enqueued: usize,
    pub walk_errors: u64,
}

/// Walks `source_dir`, sending one [`CopyJob`] per regular file found (source
/// absolute path, `dest_dir` + path relative to `source_dir`) and calling
/// `storage.mkdirp` for every directory encountered. Stops early, without
/// error, if `cancel` fires or the receiving end of `tx` has gone away.
pub async fn walk_and_enqueue(
    storage: &dyn Storage,
    source_dir: &Path,
    dest_dir: &str,
    tx: async_channel::Sender<CopyJob>,
    cancel: &CancellationToken,
) -> WalkStats {
    let mut stats = WalkStats::default();
    let dest_dir = dest_dir.trim_end_matches('/');
    let mut pending = vec![source_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            break;
        }
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) => {
                stats.walk_errors += 1;
                warn!(dir = %dir.display(), error = %e, "failed to read directory during sync walk");
                continue;
            }
        };

        loop {
            if cancel.is_cancelled() {
                return stats;
            }
            let entry = match entries.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => {
                    stats.walk_errors += 1;
                    warn!(dir = %dir.display(), error = %e, "failed to read a directory entry during sync walk");
                    break;
                }
            };

            let path = entry.path();
            let rel = match path.strip_prefix(source_dir) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    stats.walk_errors += 1;
                    continue;
                }
            };
            let dest_path = join_dest(dest_dir, &rel);

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    stats.walk_errors += 1;
                    warn!(path = %path.display(), error = %e, "failed to stat directory entry during sync walk");
                    continue;
                }
            };

            if file_type.is_dir() {
                if let Err(e) = storage.mkdirp(&dest_path).await {
                    stats.walk_errors += 1;
                    warn!(dest = %dest_path, error = %e, "failed to create destination directory");
                }
                pending.push(path);
            } else if file_type.is_file() {
                let job = CopyJob {
                    src: path.display().to_string(),
                    dest: dest_path,
                };
                if tx.send(job).await.is_err() {
                    return stats;
                }
                stats.files_enqueued += 1;
            }
        }
    }
    stats
}

fn join_dest(dest_dir: &str, rel: &PathBuf) -> String {
    format!("{dest_dir}/{}", rel.to_string_lossy())
}
