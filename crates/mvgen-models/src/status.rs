//! Client-facing job status view.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{FailureKind, GenerationJob, JobId, JobKind, JobPayload, JobStatus};

/// Answer to "what is job X doing?".
///
/// `Unknown` (no record) is reported apart from `Pending`. `Running` records are
/// folded into `Pending` with `running = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusView {
    Unknown {
        job_id: JobId,
    },
    Pending {
        job_id: JobId,
        kind: JobKind,
        running: bool,
        created_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
    },
    Succeeded {
        job_id: JobId,
        kind: JobKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<JobPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<DateTime<Utc>>,
    },
    Failed {
        job_id: JobId,
        kind: JobKind,
        failure_kind: FailureKind,
        reason: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<DateTime<Utc>>,
    },
}

impl StatusView {
    /// Build the view for `job_id` from its stored record, if any.
    pub fn from_record(job_id: &JobId, record: Option<&GenerationJob>) -> Self {
        let Some(job) = record else {
            return StatusView::Unknown {
                job_id: job_id.clone(),
            };
        };

        match job.status {
            JobStatus::Pending | JobStatus::Running => StatusView::Pending {
                job_id: job.id.clone(),
                kind: job.kind,
                running: job.status == JobStatus::Running,
                created_at: job.created_at,
                started_at: job.started_at,
            },
            JobStatus::Succeeded => StatusView::Succeeded {
                job_id: job.id.clone(),
                kind: job.kind,
                result: job.result.clone(),
                completed_at: job.completed_at,
            },
            JobStatus::Failed => {
                let (failure_kind, reason) = match &job.failure {
                    Some(f) => (f.kind, f.reason.clone()),
                    None => (FailureKind::Internal, "no failure detail recorded".to_string()),
                };
                StatusView::Failed {
                    job_id: job.id.clone(),
                    kind: job.kind,
                    failure_kind,
                    reason,
                    retryable: failure_kind.is_retryable(),
                    completed_at: job.completed_at,
                }
            }
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, StatusView::Unknown { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusView::Pending { .. })
    }
}
