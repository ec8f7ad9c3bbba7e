pub mod s3;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to upload '{key}': {message}")]
    Upload { key: String, message: String },

    #[error("failed to read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },
}

/// Durable object storage for finished artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `key`.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), StorageError>;

    /// Public URL an object will be served from.
    fn public_url(&self, key: &str) -> String;
}
