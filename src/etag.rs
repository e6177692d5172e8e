//! S3-compatible ETag computation.
//!
//! Replicates the ETag S3 records for an object so that local files can be
//! compared against the bucket listing without downloading anything:
//!
//! - objects uploaded in a single part get the plain MD5 of their bytes;
//! - multipart uploads get the MD5 of the concatenated *raw* 16-byte part
//!   digests, suffixed with `-{part_count}`.
//!
//! Both forms are quoted, exactly as `ListObjectsV2` returns them. The match
//! only holds when the part size used here equals the part size used for the
//! upload, so [`CHUNK_SIZE`] is shared with the uploader's multipart
//! threshold and part size.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Part size for both local fingerprinting and multipart uploads (8 MiB).
///
/// Changing this invalidates every stored ETag as a change-detection
/// baseline; it must never differ from the uploader's part size.
pub const CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Read buffer size for hashing
const READ_BUF_SIZE: usize = 256 * 1024;

/// Compute the quoted S3 ETag for a byte stream.
///
/// Returns `Ok(None)` for an empty stream: S3 assigns empty objects an ETag,
/// but there is no meaningful content fingerprint to compare, so callers
/// treat empty files as always-upload.
pub fn compute_etag<R: Read>(mut reader: R, chunk_size: u64) -> io::Result<Option<String>> {
    assert!(chunk_size > 0, "chunk size must be non-zero");

    let mut part_digests: Vec<[u8; 16]> = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    // One iteration per part. The inner loop fills a part up to chunk_size;
    // EOF on the first read of a part means no trailing empty part is
    // emitted when the stream length is an exact multiple of chunk_size.
    'parts: loop {
        let mut ctx = md5::Context::new();
        let mut filled: u64 = 0;

        while filled < chunk_size {
            let want = buf.len().min((chunk_size - filled) as usize);
            let n = reader.read(&mut buf[..want])?;
            if n == 0 {
                if filled == 0 {
                    break 'parts;
                }
                break;
            }
            ctx.consume(&buf[..n]);
            filled += n as u64;
        }

        part_digests.push(*ctx.compute());
    }

    Ok(match part_digests.len() {
        0 => None,
        1 => Some(format!("\"{:x}\"", md5::Digest(part_digests[0]))),
        n => {
            let mut ctx = md5::Context::new();
            for digest in &part_digests {
                ctx.consume(digest);
            }
            Some(format!("\"{:x}-{}\"", ctx.compute(), n))
        }
    })
}

/// Compute the quoted S3 ETag for a local file.
pub fn etag_of_file(path: &Path, chunk_size: u64) -> io::Result<Option<String>> {
    let file = File::open(path)?;
    compute_etag(BufReader::with_capacity(READ_BUF_SIZE, file), chunk_size)
}
