//! S3 implementation of [`RemoteStore`] plus the bucket lifecycle calls
//! used by `setup-bucket` (create, public-read policy, website config).
//!
//! Uploads use the same part size as the local ETag computation, so the
//! ETag S3 records for an upload is exactly what the next sync run computes
//! locally for the unchanged file.

use crate::error::{Result, SyncError};
use crate::etag::CHUNK_SIZE;
use crate::store::{BucketInit, ListPage, RemoteStore};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    ErrorDocument, IndexDocument, WebsiteConfiguration,
};
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Index document for website hosting
const INDEX_DOCUMENT: &str = "index.html";

/// Error document for website hosting
const ERROR_DOCUMENT: &str = "error.html";

/// S3-backed remote store for one bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the ambient AWS configuration, with optional
    /// profile and region overrides.
    pub async fn connect(
        bucket: impl Into<String>,
        profile: Option<&str>,
        region: Option<&str>,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List all bucket names on the account.
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    /// Attach the public-read GetObject policy to the bucket.
    pub async fn set_public_policy(&self) -> Result<()> {
        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "PublicReadGetObject",
                "Effect": "Allow",
                "Principal": "*",
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", self.bucket)],
            }]
        });

        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;

        Ok(())
    }

    /// Enable static website hosting with the standard index/error documents.
    pub async fn configure_website(&self) -> Result<()> {
        let index = IndexDocument::builder()
            .suffix(INDEX_DOCUMENT)
            .build()
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;
        let error = ErrorDocument::builder()
            .key(ERROR_DOCUMENT)
            .build()
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;

        self.client
            .put_bucket_website()
            .bucket(&self.bucket)
            .website_configuration(
                WebsiteConfiguration::builder()
                    .index_document(index)
                    .error_document(error)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;

        Ok(())
    }

    /// Resolve the bucket's region. S3 reports us-east-1 as an empty
    /// location constraint.
    pub async fn region(&self) -> Result<String> {
        let response = self
            .client
            .get_bucket_location()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| SyncError::BucketLifecycle { source: e.into() })?;

        Ok(response
            .location_constraint()
            .map(BucketLocationConstraint::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("us-east-1")
            .to_string())
    }

    /// Public website URL for the bucket.
    pub async fn website_url(&self) -> Result<String> {
        let region = self.region().await?;
        Ok(website_endpoint(&self.bucket, &region))
    }

    async fn put_single(&self, path: &Path, key: &str, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| SyncError::LocalRead {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::Upload {
                key: key.to_string(),
                source: e.into(),
            })?;

        Ok(())
    }

    /// Multipart upload with CHUNK_SIZE parts, so S3's recorded ETag matches
    /// the local fingerprint for the same bytes.
    async fn put_multipart(&self, path: &Path, key: &str, content_type: &str) -> Result<()> {
        let upload_err = |e: anyhow::Error| SyncError::Upload {
            key: key.to_string(),
            source: e,
        };

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|source| SyncError::LocalRead {
                path: path.to_path_buf(),
                source,
            })?;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| upload_err(e.into()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| upload_err(anyhow::anyhow!("no upload id returned")))?
            .to_string();

        let mut completed_parts: Vec<CompletedPart> = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut part = Vec::with_capacity(CHUNK_SIZE as usize);
            (&mut file)
                .take(CHUNK_SIZE)
                .read_to_end(&mut part)
                .await
                .map_err(|source| SyncError::LocalRead {
                    path: path.to_path_buf(),
                    source,
                })?;
            if part.is_empty() {
                break;
            }
            let part_len = part.len() as u64;

            let uploaded = match self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
            {
                Ok(out) => out,
                Err(e) => {
                    self.abort_multipart(key, &upload_id).await;
                    return Err(upload_err(e.into()));
                }
            };

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
            debug!(key, part_number, part_len, "uploaded part");

            part_number += 1;
            if part_len < CHUNK_SIZE {
                break;
            }
        }

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await;

        if let Err(e) = result {
            self.abort_multipart(key, &upload_id).await;
            return Err(upload_err(e.into()));
        }

        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            warn!(key, "failed to abort multipart upload: {e}");
        }
    }
}

/// Build the static-website URL for a bucket in a region.
///
/// Regions that existed before 2014 serve website endpoints with a dash
/// after `s3-website`; every region launched since only answers on the
/// dotted form.
fn website_endpoint(bucket: &str, region: &str) -> String {
    const DASH_REGIONS: &[&str] = &[
        "us-east-1",
        "us-west-1",
        "us-west-2",
        "ap-southeast-1",
        "ap-southeast-2",
        "ap-northeast-1",
        "eu-west-1",
        "sa-east-1",
        "us-gov-west-1",
    ];

    if DASH_REGIONS.contains(&region) {
        format!("http://{bucket}.s3-website-{region}.amazonaws.com")
    } else {
        format!("http://{bucket}.s3-website.{region}.amazonaws.com")
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| SyncError::RemoteListing { source: e.into() })?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| match (obj.key(), obj.e_tag()) {
                (Some(key), Some(etag)) => Some((key.to_string(), etag.to_string())),
                _ => None,
            })
            .collect();

        Ok(ListPage {
            objects,
            next_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> Result<()> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| SyncError::LocalRead {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        // Strictly-greater threshold: a file of exactly CHUNK_SIZE goes up
        // as a single put, whose plain-MD5 ETag matches the single-chunk
        // local fingerprint.
        if size > CHUNK_SIZE {
            self.put_multipart(path, key, content_type).await
        } else {
            self.put_single(path, key, content_type).await
        }
    }

    async fn ensure_bucket(&self) -> Result<BucketInit> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);

        // us-east-1 is the default and rejects an explicit constraint
        if let Some(region) = self.client.config().region() {
            let name = region.as_ref();
            if name != "us-east-1" {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(name))
                        .build(),
                );
            }
        }

        match request.send().await {
            Ok(_) => Ok(BucketInit::Created),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_bucket_already_owned_by_you() {
                    Ok(BucketInit::AlreadyOwned)
                } else {
                    Err(SyncError::BucketLifecycle {
                        source: service_err.into(),
                    })
                }
            }
        }
    }
}
