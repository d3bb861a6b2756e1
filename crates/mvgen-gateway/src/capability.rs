//! Request/poll contract shared by the remote capabilities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

/// Handle returned by a remote service for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobToken(pub String);

impl JobToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one status request.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// Still running, or the status could not be read this cycle
    Pending,
    /// Finished with a payload
    Completed(T),
    /// The service reported failure
    Failed(String),
}

impl<T> PollOutcome<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PollOutcome::Pending)
    }
}

/// A slow remote generation service with a submit/poll contract.
///
/// Implementations make exactly one network call per `submit_once` or
/// `poll_once`. The provided `submit` and `poll` add the caller-facing policy.
#[async_trait]
pub trait Capability: Send + Sync {
    type Params: Send + Sync;
    type Payload: Send;

    /// Service name used in logs.
    fn name(&self) -> &'static str;

    /// Single submission attempt.
    async fn submit_once(&self, params: &Self::Params) -> GatewayResult<JobToken>;

    /// Single status request.
    async fn poll_once(&self, token: &JobToken) -> GatewayResult<PollOutcome<Self::Payload>>;

    /// Submit, retrying exactly once immediately on failure.
    async fn submit(&self, params: &Self::Params) -> GatewayResult<JobToken> {
        match self.submit_once(params).await {
            Ok(token) => Ok(token),
            Err(first) => {
                warn!(service = self.name(), error = %first, "Submission failed, retrying once");
                self.submit_once(params).await.map_err(|second| {
                    GatewayError::SubmissionFailed(format!(
                        "{} rejected the job twice: {} (first attempt: {})",
                        self.name(),
                        second,
                        first
                    ))
                })
            }
        }
    }

    /// Poll once; errors count as `Pending` for this cycle.
    async fn poll(&self, token: &JobToken) -> PollOutcome<Self::Payload> {
        match self.poll_once(token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_transient() {
                    debug!(service = self.name(), token = %token, error = %e, "Transient poll error");
                } else {
                    warn!(service = self.name(), token = %token, error = %e, "Poll error treated as pending");
                }
                PollOutcome::Pending
            }
        }
    }
}
