use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{Client, config::Region, config::Credentials, config::BehaviorVersion};
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use super::{ObjectStore, StorageError};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    public_base: Url,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: Option<&str>,
    ) -> Result<Self> {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        let public_base = match public_base_url {
            Some(base) => base_url(base)?,
            None => base_url(&format!("{}/{}", endpoint.trim_end_matches('/'), bucket))?,
        };

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            public_base,
        })
    }

    pub async fn check_bucket(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| anyhow!("Bucket '{}' is not reachable: {}", self.bucket, e))?;

        info!("✅ Connected to S3 (MinIO), bucket '{}'", self.bucket);
        Ok(())
    }
}

/// Parses `base` as a directory URL so relative keys join under it.
fn base_url(base: &str) -> Result<Url> {
    let normalized = format!("{}/", base.trim_end_matches('/'));
    Url::parse(&normalized).with_context(|| format!("Invalid public base URL '{}'", base))
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!(key = %key, content_type = %content_type, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        match self.public_base.join(key) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.public_base, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_joins_nested_keys() {
        let base = base_url("https://cdn.example.com/media").unwrap();
        let url = base.join("c1/videos/j1/720p/playlist.m3u8").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/media/c1/videos/j1/720p/playlist.m3u8");

        let base = base_url("http://localhost:9000/videos/").unwrap();
        assert_eq!(base.as_str(), "http://localhost:9000/videos/");
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(base_url("not a url").is_err());
    }
}
