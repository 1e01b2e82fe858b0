use std::path::PathBuf;

use crate::error::{Error, Result};

const GCS_SCHEME: &str = "gs://";

/// A parsed blob path: either a local filesystem path or a `gs://bucket/key`
/// object-store location.
///
/// Scheme discrimination is purely textual: anything starting with
/// `gs://` is remote, everything else is local. The bucket/key split
/// requires at least two characters of bucket name before the next `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Location {
    Local(PathBuf),
    Gcs { bucket: String, key: String },
}

impl Location {
    pub(crate) fn parse(path: &str) -> Result<Self> {
        match path.strip_prefix(GCS_SCHEME) {
            Some(rest) => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.len() < 2 {
                    return Err(Error::InvalidUrl(path.to_string()));
                }
                Ok(Location::Gcs {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            None => Ok(Location::Local(PathBuf::from(path))),
        }
    }
}
