//! Pipeline job records and their status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{FailureDetail, JobPayload};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Music generation for the whole request
    AudioSynthesis,
    /// Video clip generation for one lyric line
    ClipSynthesis,
    /// Assembly, muxing, upload and catalog write
    Finishing,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AudioSynthesis => "audio_synthesis",
            JobKind::ClipSynthesis => "clip_synthesis",
            JobKind::Finishing => "finishing",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored job status.
///
/// `Unknown` is not a stored state; it is what the status view reports for an id
/// with no record (see [`crate::StatusView`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet picked up by a worker
    #[default]
    Pending,
    /// Picked up by a worker
    Running,
    /// Finished with a result payload
    Succeeded,
    /// Finished with a failure detail
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// A job record tracked for status queries.
///
/// Records are written by the orchestrator when the graph is submitted and then
/// only by the worker executing the job. Transitions on a terminal record are no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Unique job ID
    pub id: JobId,

    /// Pipeline this job belongs to (equal to `id` for the finishing job)
    pub pipeline_id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Lyric line position (clip jobs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Result payload (if succeeded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobPayload>,

    /// Failure detail (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl GenerationJob {
    /// Create a pending record.
    pub fn new(id: JobId, pipeline_id: JobId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            pipeline_id,
            kind,
            status: JobStatus::Pending,
            ordinal: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            failure: None,
        }
    }

    /// Set the lyric line ordinal.
    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job as picked up by a worker.
    pub fn start(mut self) -> Self {
        if self.is_terminal() {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Mark the job as succeeded with its payload.
    pub fn succeed(mut self, payload: JobPayload) -> Self {
        if self.is_terminal() {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Succeeded;
        self.result = Some(payload);
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Mark the job as failed.
    pub fn fail(mut self, failure: FailureDetail) -> Self {
        if self.is_terminal() {
            return self;
        }
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioResult, FailureKind};

    fn audio_job() -> GenerationJob {
        let pipeline = JobId::new();
        GenerationJob::new(JobId::new(), pipeline, JobKind::AudioSynthesis)
    }

    #[test]
    fn test_job_lifecycle() {
        let job = audio_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_terminal());

        let job = job.start();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        let job = job.succeed(JobPayload::Audio(AudioResult {
            url: "https://cdn.example.com/a.mp3".to_string(),
            duration_secs: 42.0,
            image_url: None,
        }));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let job = audio_job()
            .start()
            .fail(FailureDetail::new(FailureKind::PollingTimeout, "no answer in 900s"));
        let snapshot = job.clone();

        let job = job.start();
        assert_eq!(job, snapshot);

        let job = job.succeed(JobPayload::Audio(AudioResult {
            url: "https://cdn.example.com/a.mp3".to_string(),
            duration_secs: 1.0,
            image_url: None,
        }));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_restart_keeps_first_start_time() {
        let job = audio_job().start();
        let first = job.started_at;
        let job = job.start();
        assert_eq!(job.started_at, first);
    }

    #[test]
    fn test_job_id_serializes_transparently() {
        let id = JobId::from_string("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_eq!(id.to_string(), "abc");
    }
}
