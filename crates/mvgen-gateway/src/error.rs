//! Gateway error types.

use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Transport-level failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(_) => true,
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let server = GatewayError::Status {
            service: "audio",
            status: 503,
            body: String::new(),
        };
        let limited = GatewayError::Status {
            service: "audio",
            status: 429,
            body: String::new(),
        };
        let rejected = GatewayError::Status {
            service: "audio",
            status: 400,
            body: "bad prompt".to_string(),
        };
        assert!(server.is_transient());
        assert!(limited.is_transient());
        assert!(!rejected.is_transient());
        assert!(!GatewayError::invalid_response("x").is_transient());
    }
}
