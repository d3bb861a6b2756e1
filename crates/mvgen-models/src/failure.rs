//! Failure taxonomy shared by every pipeline stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request rejected before fan-out
    #[serde(rename = "validation_error")]
    Validation,
    /// Remote service rejected the submission after one retry
    SubmissionFailed,
    /// Remote job did not finish within the poll budget
    PollingTimeout,
    /// Remote service reported failure
    RemoteFailed,
    /// No successful clip reached the finishing stage
    NoUsableClips,
    /// Audio synthesis did not produce a track
    AudioUnavailable,
    /// Catalog rejected the finished video's metadata
    #[serde(rename = "persistence_validation_error")]
    PersistenceValidation,
    /// Infrastructure failure after retries were exhausted
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation_error",
            FailureKind::SubmissionFailed => "submission_failed",
            FailureKind::PollingTimeout => "polling_timeout",
            FailureKind::RemoteFailed => "remote_failed",
            FailureKind::NoUsableClips => "no_usable_clips",
            FailureKind::AudioUnavailable => "audio_unavailable",
            FailureKind::PersistenceValidation => "persistence_validation_error",
            FailureKind::Internal => "internal",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::PollingTimeout | FailureKind::SubmissionFailed | FailureKind::Internal
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure kind plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}
