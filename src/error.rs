//! Error taxonomy for sitesync.
//!
//! Fatal errors (listing, scan) abort the run; per-file errors (read,
//! upload) are collected by the sync engine so one bad file does not stop
//! the rest of the tree.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The bucket listing could not be fully retrieved. A partial manifest
    /// would produce wrong skip/upload decisions, so this aborts the run.
    #[error("failed to list bucket contents: {source}")]
    RemoteListing {
        #[source]
        source: anyhow::Error,
    },

    /// A local file could not be read for fingerprinting (permissions,
    /// vanished between scan and read). Per-file.
    #[error("failed to read {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A transfer failed. Per-file; the key is kept so the upload can be
    /// retried manually.
    #[error("failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A bucket collaborator call failed (create, policy, website config).
    #[error("bucket operation failed: {source}")]
    BucketLifecycle {
        #[source]
        source: anyhow::Error,
    },

    /// The local tree walk failed.
    #[error("failed to walk local tree: {source}")]
    Scan {
        #[source]
        source: ignore::Error,
    },
}

impl SyncError {
    /// Short kind label for summaries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::RemoteListing { .. } => "remote-listing",
            SyncError::LocalRead { .. } => "local-read",
            SyncError::Upload { .. } => "upload",
            SyncError::BucketLifecycle { .. } => "bucket-lifecycle",
            SyncError::Scan { .. } => "scan",
        }
    }
}
