//! Object storage errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or malformed `STORAGE_*` settings.
    #[error("Storage configuration: {0}")]
    ConfigError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Key that would escape its prefix.
    #[error("Rejected object key '{0}'")]
    InvalidKey(String),

    #[error("Bucket unreachable: {0}")]
    Unreachable(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    /// A put under the same key overwrites, so a failed upload can simply be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UploadFailed(_) | Self::Unreachable(_))
    }
}
