//! S3-compatible bucket client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the bucket client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region ("auto" for R2)
    pub region: String,
    /// Base under which uploaded keys are publicly readable
    pub public_base_url: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let public_base_url = required("STORAGE_PUBLIC_URL")?;
        url::Url::parse(&public_base_url)
            .map_err(|e| StorageError::config_error(format!("STORAGE_PUBLIC_URL is not a URL: {}", e)))?;

        Ok(Self {
            endpoint_url: required("STORAGE_ENDPOINT_URL")?,
            access_key_id: required("STORAGE_ACCESS_KEY_ID")?,
            secret_access_key: required("STORAGE_SECRET_ACCESS_KEY")?,
            bucket_name: required("STORAGE_BUCKET_NAME")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Public URL of an object key.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name).map_err(|_| StorageError::config_error(format!("{} not set", name)))
}

/// Write-once artifact storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file and return its public URL.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;
}

/// Bucket client over the AWS SDK.
#[derive(Clone)]
pub struct BucketClient {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl BucketClient {
    /// Create a new client from configuration.
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "mvgen-storage",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn put(&self, body: ByteStream, key: &str, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        Ok(self.public_url(key))
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(format!("head bucket {}: {}", self.bucket, e)))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        let url = self.put(body, key, content_type).await?;

        info!(key = %key, "Uploaded {}", path.display());
        Ok(url)
    }
}

/// Reject keys that would escape their prefix or address the bucket root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == ".." || part.is_empty()) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("mv_videos/u_20240101_000000.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs.mp4").is_err());
        assert!(validate_key("mv_videos/../x.mp4").is_err());
        assert!(validate_key("mv_videos//x.mp4").is_err());
    }

    #[test]
    fn test_public_url_joins_once() {
        let config = StorageConfig {
            endpoint_url: "http://localhost:9000".into(),
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            bucket_name: "b".into(),
            region: "auto".into(),
            public_base_url: "https://cdn.example.com".into(),
        };
        assert_eq!(
            config.public_url("/mv_covers/a.jpg"),
            "https://cdn.example.com/mv_covers/a.jpg"
        );
        let client = BucketClient::new(config);
        assert_eq!(
            client.public_url("mv_videos/a.mp4"),
            "https://cdn.example.com/mv_videos/a.mp4"
        );
    }
}
