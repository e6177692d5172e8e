//! Remote object store abstraction.
//!
//! The sync engine and manifest loader only see [`RemoteStore`]; the S3
//! implementation lives in [`s3`]. Tests drive the engine against an
//! in-memory store.

pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub use s3::S3Store;

/// One page of a bucket listing.
#[derive(Debug, Default)]
pub struct ListPage {
    /// (key, quoted ETag) pairs on this page
    pub objects: Vec<(String, String)>,

    /// Continuation token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Result of an idempotent create-bucket call.
///
/// Only "already owned by this account" counts as success; a name taken by
/// someone else stays an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketInit {
    Created,
    AlreadyOwned,
}

/// Operations the sync engine needs from a remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one listing page, starting from `continuation` (or the
    /// beginning when `None`).
    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage>;

    /// Transfer a local file to `key`, overwriting any existing object.
    /// Single attempt; the caller decides whether to retry.
    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> Result<()>;

    /// Create the bucket if it does not exist yet.
    async fn ensure_bucket(&self) -> Result<BucketInit>;
}
