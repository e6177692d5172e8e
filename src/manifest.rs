//! Remote manifest: the bucket's key -> ETag snapshot.
//!
//! Loaded once at the start of a sync run, before any local file is
//! inspected, then shared read-only across workers. A listing failure is
//! fatal: deciding skips against a partial manifest would silently re-upload
//! or, worse, skip changed files.

use crate::error::Result;
use crate::store::RemoteStore;
use std::collections::HashMap;

/// Snapshot of every object key currently in the bucket and its stored
/// quoted ETag.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: HashMap<String, String>,
}

impl Manifest {
    /// Load the full manifest, following continuation tokens until the
    /// listing is exhausted.
    pub async fn load(store: &dyn RemoteStore) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = store.list_page(continuation.take()).await?;
            for (key, etag) in page.objects {
                entries.insert(key, etag);
            }
            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(Self { entries })
    }

    /// Stored ETag for `key`, if the object exists remotely.
    pub fn etag(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (key, etag) entries. Used by the object listing command.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
