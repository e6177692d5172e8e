//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sitesync", version, about = "Deploy static sites to S3")]
pub struct Cli {
    /// AWS profile to use
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// AWS region override
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all buckets on the account
    ListBuckets,

    /// List objects in a bucket with their stored ETags
    ListObjects {
        /// Bucket name
        bucket: String,
    },

    /// Create a bucket and configure it for public static website hosting
    SetupBucket {
        /// Bucket name
        bucket: String,
    },

    /// Sync a local directory to a bucket, uploading only changed files
    Sync {
        /// Local directory to sync
        path: PathBuf,

        /// Destination bucket
        bucket: String,

        /// Number of concurrent transfers
        #[arg(long, short = 'j')]
        workers: Option<usize>,

        /// Per-file transfer timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}
