use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use crate::config::Config;

/// Destination for publicly readable preview images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` with public-read access and return its public URL.
    async fn put_public(&self, key: &str, data: &[u8], content_type: &str) -> Result<String>;
}

/// S3 client wrapper.
#[derive(Clone)]
pub struct S3Client {
    bucket: Box<Bucket>,
    endpoint: Option<String>,
    public_base_url: Option<String>,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if client initialization fails.
    pub fn new(config: &Config) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.aws_access_key_id),
            Some(&config.aws_secret_access_key),
            None,
            None,
            None,
        )
        .context("Failed to create S3 credentials")?;

        let region = if let Some(ref endpoint) = config.s3_endpoint {
            Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            }
        } else {
            config.s3_region.parse().unwrap_or(Region::UsEast1)
        };

        let mut bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .context("Failed to create S3 bucket")?;

        // Uploads are previews shown to anonymous visitors
        bucket.add_header("x-amz-acl", "public-read");

        // Use path-style for custom endpoints (MinIO, R2, etc.)
        let bucket = if config.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            endpoint: config.s3_endpoint.clone(),
            public_base_url: config.s3_public_base_url.clone(),
        })
    }

    /// Upload bytes to S3.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails or S3 answers with a non-2xx status.
    pub async fn upload_bytes(&self, data: &[u8], s3_key: &str, content_type: &str) -> Result<()> {
        debug!(key = %s3_key, content_type = %content_type, size = data.len(), "Uploading bytes to S3");

        let response = self
            .bucket
            .put_object_with_content_type(s3_key, data, content_type)
            .await
            .context("Failed to upload bytes to S3")?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            bail!("S3 upload of {s3_key} failed with status {status}");
        }

        Ok(())
    }

    /// Get the public URL for an object.
    #[must_use]
    pub fn get_public_url(&self, s3_key: &str) -> String {
        public_url(
            self.public_base_url.as_deref(),
            self.endpoint.as_deref(),
            &self.bucket.name(),
            s3_key,
        )
    }

    /// Get the bucket name
    #[must_use]
    pub fn bucket_name(&self) -> String {
        self.bucket.name().to_string()
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_public(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        self.upload_bytes(data, key, content_type).await?;
        Ok(self.get_public_url(key))
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn public_url(
    public_base_url: Option<&str>,
    endpoint: Option<&str>,
    bucket: &str,
    key: &str,
) -> String {
    match (public_base_url, endpoint) {
        (Some(base), _) => format!("{}/{key}", base.trim_end_matches('/')),
        (None, Some(endpoint)) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
        (None, None) => format!("https://{bucket}.s3.amazonaws.com/{key}"),
    }
}
