//! Local tree walker.
//!
//! Pure traversal: produces the list of files to consider, with their
//! remote keys, and nothing else. Hashing and uploading happen in the sync
//! engine so the walk stays testable on its own.

use crate::error::{Result, SyncError};
use std::path::{Component, Path, PathBuf};

/// A candidate file produced by the walk.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path on the local filesystem
    pub path: PathBuf,

    /// Remote object key: path relative to the sync root, `/`-separated,
    /// no leading slash
    pub key: String,

    /// File size in bytes
    pub size: u64,
}

/// Recursive walker over a sync root.
pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk the tree and collect every regular file.
    ///
    /// Blocking; the sync engine runs this under `spawn_blocking`. Hidden
    /// files are included and ignore files are not honored: everything
    /// under the root is site content. No ordering guarantee.
    pub fn scan(&self) -> Result<Vec<FileRecord>> {
        let walker = ignore::WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut records = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| SyncError::Scan { source })?;

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let meta = entry.metadata().map_err(|source| SyncError::Scan { source })?;

            records.push(FileRecord {
                key: key_for(&self.root, entry.path()),
                path: entry.path().to_path_buf(),
                size: meta.len(),
            });
        }

        Ok(records)
    }
}

/// Derive the remote key for a path under `root`.
///
/// Strips the root prefix and joins the remaining components with `/`,
/// normalizing OS-native separators.
fn key_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
