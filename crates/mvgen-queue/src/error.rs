//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    /// A job with the same idempotency key was already enqueued.
    #[error("Duplicate job: {0}")]
    Duplicate(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Barrier error: {0}")]
    Barrier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn barrier(msg: impl Into<String>) -> Self {
        Self::Barrier(msg.into())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
