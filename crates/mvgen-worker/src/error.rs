//! Worker error types.
//!
//! A `WorkerError` is an infrastructure failure: the attempt did not reach a
//! terminal outcome and may be retried. Domain failures such as a remote
//! timeout travel as [`FailureDetail`] values instead.

use thiserror::Error;

use mvgen_media::MediaError;
use mvgen_models::{FailureDetail, FailureKind};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No handler for {0} jobs in this worker")]
    NoHandler(&'static str),

    #[error("Job semaphore closed")]
    SemaphoreClosed,

    #[error("Gateway error: {0}")]
    Gateway(#[from] mvgen_gateway::GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] mvgen_storage::StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] mvgen_catalog::CatalogError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] mvgen_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::DownloadFailed(_) | WorkerError::Queue(_) | WorkerError::Io(_) => true,
            WorkerError::Gateway(e) => e.is_transient(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Catalog(e) => e.is_retryable(),
            WorkerError::Media(e) => !matches!(
                e,
                MediaError::NoUsableClips
                    | MediaError::InvalidInput(_)
                    | MediaError::FfmpegNotFound
                    | MediaError::FfprobeNotFound
            ),
            WorkerError::ConfigError(_) | WorkerError::NoHandler(_) | WorkerError::SemaphoreClosed => false,
        }
    }

    /// Terminal failure recorded when this error ends a job.
    pub fn failure_detail(&self) -> FailureDetail {
        let kind = match self {
            WorkerError::Media(MediaError::NoUsableClips) => FailureKind::NoUsableClips,
            WorkerError::Catalog(e) if e.is_validation() => FailureKind::PersistenceValidation,
            _ => FailureKind::Internal,
        };
        FailureDetail::new(kind, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgen_catalog::CatalogError;

    #[test]
    fn test_retryable_errors() {
        assert!(WorkerError::download_failed("reset").is_retryable());
        assert!(WorkerError::Catalog(CatalogError::ServerError(503, "busy".into())).is_retryable());
        assert!(!WorkerError::Media(MediaError::NoUsableClips).is_retryable());
        assert!(!WorkerError::config_error("missing bucket").is_retryable());
    }

    #[test]
    fn test_failure_detail_kinds() {
        let detail = WorkerError::Media(MediaError::NoUsableClips).failure_detail();
        assert_eq!(detail.kind, FailureKind::NoUsableClips);

        let detail = WorkerError::Catalog(CatalogError::Validation("title too long".into())).failure_detail();
        assert_eq!(detail.kind, FailureKind::PersistenceValidation);

        let detail = WorkerError::download_failed("timeout").failure_detail();
        assert_eq!(detail.kind, FailureKind::Internal);
        assert!(detail.reason.contains("timeout"));
    }
}
