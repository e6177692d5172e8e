//! sitesync binary entry point.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use sitesync::manifest::Manifest;
use sitesync::progress;
use sitesync::store::{BucketInit, RemoteStore, S3Store};
use sitesync::sync::SyncEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let region = cli.region.as_deref();

    match cli.command {
        Command::ListBuckets => {
            // Bucket name is irrelevant for an account-level listing
            let store = S3Store::connect("", profile, region).await;
            for name in store.list_buckets().await? {
                println!("{name}");
            }
        }

        Command::ListObjects { bucket } => {
            let store = S3Store::connect(&bucket, profile, region).await;
            let manifest = Manifest::load(&store).await?;
            let mut entries: Vec<_> = manifest.iter().collect();
            entries.sort();
            for (key, etag) in entries {
                println!("{key}\t{etag}");
            }
        }

        Command::SetupBucket { bucket } => {
            let store = S3Store::connect(&bucket, profile, region).await;
            match store.ensure_bucket().await? {
                BucketInit::Created => println!("created bucket {bucket}"),
                BucketInit::AlreadyOwned => println!("bucket {bucket} already exists"),
            }
            store.set_public_policy().await?;
            store.configure_website().await?;
            println!("{}", store.website_url().await?);
        }

        Command::Sync {
            path,
            bucket,
            workers,
            timeout,
        } => {
            let store = Arc::new(S3Store::connect(&bucket, profile, region).await);
            run_sync(store, &path, workers, timeout).await?;
        }
    }

    Ok(())
}

async fn run_sync(
    store: Arc<S3Store>,
    path: &Path,
    workers: Option<usize>,
    timeout: Option<u64>,
) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, letting in-flight uploads finish...");
            let _ = cancel_tx.send(true);
        }
    });

    let workers = workers.unwrap_or_else(|| num_cpus::get().min(8));
    let mut engine = SyncEngine::new(store.clone(), workers, cancel_rx)
        .with_progress(progress::sync_bar());
    if let Some(secs) = timeout {
        engine = engine.with_file_timeout(Duration::from_secs(secs));
    }

    let report = engine.run(path).await?;

    println!(
        "{} uploaded, {} skipped, {} failed",
        report.uploaded.len().to_string().green(),
        report.skipped.len(),
        if report.failed.is_empty() {
            "0".normal()
        } else {
            report.failed.len().to_string().red()
        },
    );
    for (key, err) in &report.failed {
        eprintln!("  {} {key}: {err} [{}]", "failed".red(), err.kind());
    }
    if !report.cancelled.is_empty() {
        eprintln!(
            "  {} files not attempted (cancelled):",
            report.cancelled.len()
        );
        for key in &report.cancelled {
            eprintln!("    {key}");
        }
    }

    if !report.is_clean() || !report.cancelled.is_empty() {
        std::process::exit(1);
    }

    println!("{}", store.website_url().await?);
    Ok(())
}
