//! sitesync - content-addressed directory sync to S3.
//!
//! Uploads only files whose bytes changed since the last run, by computing
//! the same multipart ETag S3 records for its objects and diffing against
//! the bucket listing.

pub mod error;
pub mod etag;
pub mod manifest;
pub mod progress;
pub mod scanner;
pub mod store;
pub mod sync;
