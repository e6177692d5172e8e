//! Sync decision engine.
//!
//! One run: load the remote manifest, scan the local tree, then hash,
//! compare, and upload each file as an independent unit of work on a
//! bounded worker pool. The manifest is the only shared state and is
//! read-only once loaded.
//!
//! Per-file failures are collected rather than aborting the run: everything
//! that can be uploaded is, and the caller exits non-zero if anything
//! failed.

use crate::error::SyncError;
use crate::etag::{self, CHUNK_SIZE};
use crate::manifest::Manifest;
use crate::scanner::{FileRecord, Scanner};
use crate::store::RemoteStore;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Content type for keys with no extension mapping. Site content is
/// overwhelmingly HTML, so extensionless keys are served as pages.
const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Uploaded,
    Skipped,
}

/// Result of a sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Keys that were transferred
    pub uploaded: Vec<String>,

    /// Keys whose remote ETag already matched the local content
    pub skipped: Vec<String>,

    /// Keys that failed, with the per-file error
    pub failed: Vec<(String, SyncError)>,

    /// Keys never attempted because the run was cancelled
    pub cancelled: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates one sync run against a remote store.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    workers: usize,
    cancel: watch::Receiver<bool>,
    progress: Option<ProgressBar>,
    file_timeout: Option<Duration>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        workers: usize,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            workers: workers.max(1),
            cancel,
            progress: None,
            file_timeout: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cap the time spent on any single file's transfer.
    pub fn with_file_timeout(mut self, timeout: Duration) -> Self {
        self.file_timeout = Some(timeout);
        self
    }

    /// Run a full sync of `root` into the store's bucket.
    ///
    /// Fatal errors (listing, scan) return `Err`; per-file errors land in
    /// the report. Cancellation stops issuing new work and lets in-flight
    /// uploads finish.
    pub async fn run(&self, root: &Path) -> Result<SyncReport> {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot resolve sync root {}", root.display()))?;

        let manifest = Arc::new(
            Manifest::load(self.store.as_ref())
                .await
                .context("loading remote manifest")?,
        );
        debug!(entries = manifest.len(), "remote manifest loaded");

        let scanner = Scanner::new(&root);
        let records = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .context("scan task panicked")??;
        info!(files = records.len(), root = %root.display(), "local scan complete");

        if let Some(bar) = &self.progress {
            bar.set_length(records.len() as u64);
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut report = SyncReport::default();

        for record in records {
            if *self.cancel.borrow() {
                report.cancelled.push(record.key);
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let store = Arc::clone(&self.store);
            let manifest = Arc::clone(&manifest);
            let file_timeout = self.file_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let key = record.key.clone();
                let outcome = sync_one(store.as_ref(), &manifest, &record, file_timeout).await;
                (key, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = joined.context("sync worker panicked")?;
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
            match outcome {
                Ok(Outcome::Uploaded) => {
                    info!(key = %key, "uploaded");
                    report.uploaded.push(key);
                }
                Ok(Outcome::Skipped) => {
                    debug!(key = %key, "unchanged, skipped");
                    report.skipped.push(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "sync failed");
                    report.failed.push((key, e));
                }
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        if !report.cancelled.is_empty() {
            warn!(
                not_attempted = report.cancelled.len(),
                "run cancelled before completion"
            );
        }

        Ok(report)
    }
}

/// Hash, compare, and (when changed) upload a single file.
///
/// The fingerprint comparison is exact string equality against the
/// manifest's quoted ETag. Empty files have no fingerprint and are always
/// uploaded.
async fn sync_one(
    store: &dyn RemoteStore,
    manifest: &Manifest,
    record: &FileRecord,
    file_timeout: Option<Duration>,
) -> std::result::Result<Outcome, SyncError> {
    let path = record.path.clone();
    let local_etag = tokio::task::spawn_blocking(move || etag::etag_of_file(&path, CHUNK_SIZE))
        .await
        .map_err(|e| SyncError::LocalRead {
            path: record.path.clone(),
            source: std::io::Error::other(e),
        })?
        .map_err(|source| SyncError::LocalRead {
            path: record.path.clone(),
            source,
        })?;

    if let Some(local_etag) = &local_etag {
        if manifest.etag(&record.key) == Some(local_etag.as_str()) {
            return Ok(Outcome::Skipped);
        }
    }

    let content_type = content_type_for_key(&record.key);
    let transfer = store.upload(&record.path, &record.key, &content_type);
    match file_timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .map_err(|_| SyncError::Upload {
                key: record.key.clone(),
                source: anyhow::anyhow!("transfer timed out after {limit:?}"),
            })??,
        None => transfer.await?,
    }

    Ok(Outcome::Uploaded)
}

/// Derive a content type from the key's filename extension.
pub fn content_type_for_key(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}
