//! One task per job kind.

pub mod audio;
pub mod clip;
pub mod finishing;

use std::sync::Arc;

use async_trait::async_trait;

use mvgen_catalog::MusicVideoRepository;
use mvgen_gateway::{AudioSynthesisClient, ClipSynthesisClient, GatewayConfig};
use mvgen_models::{AudioOutcome, ClipResult, FailureDetail, FanOutResult, FinishedVideo, JobPayload};
use mvgen_queue::{AudioSynthesisJob, ClipSynthesisJob, FinishingJob, QueueJob, QueueName};
use mvgen_storage::BucketClient;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::fetch::download_client;
use crate::logging::JobLogger;

pub use audio::AudioTask;
pub use clip::ClipTask;
pub use finishing::{FinishingOptions, FinishingTask};

/// Terminal outcome of one task run.
///
/// `Err` from [`PipelineTask::run`] means the attempt itself broke; a
/// `TaskOutcome` always ends the job.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Fan-out result, success or failure sentinel, bound for the barrier
    FanOut(FanOutResult),
    /// Result of the finishing stage
    Finished(Result<FinishedVideo, FailureDetail>),
}

impl TaskOutcome {
    /// What the job record stores.
    pub fn record(&self) -> Result<JobPayload, FailureDetail> {
        match self {
            TaskOutcome::FanOut(FanOutResult::Audio { outcome }) => match outcome {
                AudioOutcome::Ready { audio } => Ok(JobPayload::Audio(audio.clone())),
                AudioOutcome::Failed { failure } => Err(failure.clone()),
            },
            TaskOutcome::FanOut(FanOutResult::Clip { result }) => match result {
                ClipResult::Ready { .. } => Ok(JobPayload::Clip(result.clone())),
                ClipResult::Failed { failure, .. } => Err(failure.clone()),
            },
            TaskOutcome::Finished(Ok(video)) => Ok(JobPayload::Finished(video.clone())),
            TaskOutcome::Finished(Err(failure)) => Err(failure.clone()),
        }
    }

    /// Barrier arrival, for fan-out jobs.
    pub fn arrival(&self) -> Option<&FanOutResult> {
        match self {
            TaskOutcome::FanOut(result) => Some(result),
            TaskOutcome::Finished(_) => None,
        }
    }
}

/// Executes one job kind.
#[async_trait]
pub trait PipelineTask: Send + Sync {
    type Job: Send + Sync;

    /// Operation name used in logs and metrics.
    fn operation(&self) -> &'static str;

    async fn run(&self, job: &Self::Job, logger: &JobLogger) -> WorkerResult<TaskOutcome>;
}

/// Handlers for the queues this worker consumes.
#[derive(Clone, Default)]
pub struct TaskSet {
    pub audio: Option<Arc<dyn PipelineTask<Job = AudioSynthesisJob>>>,
    pub clip: Option<Arc<dyn PipelineTask<Job = ClipSynthesisJob>>>,
    pub finishing: Option<Arc<dyn PipelineTask<Job = FinishingJob>>>,
}

impl TaskSet {
    /// Build the tasks for the queues in `config`, with clients from the environment.
    ///
    /// Settings of services a queue does not need are never read.
    pub fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        let mut tasks = Self::default();

        if config.consumes(QueueName::Audio) || config.consumes(QueueName::Clip) {
            let gateway = GatewayConfig::from_env()?;

            if config.consumes(QueueName::Audio) {
                let client = AudioSynthesisClient::new(gateway.audio.clone())?;
                tasks.audio = Some(Arc::new(AudioTask::new(client, config.audio_poll)));
            }
            if config.consumes(QueueName::Clip) {
                let client = ClipSynthesisClient::new(gateway.clip.clone())?;
                tasks.clip = Some(Arc::new(ClipTask::new(client, config.clip_poll, gateway.clip_duration_secs)));
            }
        }

        if config.consumes(QueueName::Finishing) {
            let store = BucketClient::from_env()?;
            let catalog = MusicVideoRepository::from_env()?;
            let options = FinishingOptions {
                work_dir: config.work_dir.clone(),
                atomic_unit_secs: config.atomic_unit_secs,
                render: config.render.clone(),
                download_concurrency: config.download_concurrency,
            };
            tasks.finishing = Some(Arc::new(FinishingTask::new(
                Arc::new(store),
                Arc::new(catalog),
                download_client(config.download_timeout)?,
                options,
            )));
        }

        Ok(tasks)
    }

    /// Route a queued job to its task.
    pub async fn dispatch(&self, job: &QueueJob, logger: &JobLogger) -> WorkerResult<TaskOutcome> {
        match job {
            QueueJob::AudioSynthesis(j) => {
                let task = self.audio.as_ref().ok_or(WorkerError::NoHandler("audio_synthesis"))?;
                task.run(j, logger).await
            }
            QueueJob::ClipSynthesis(j) => {
                let task = self.clip.as_ref().ok_or(WorkerError::NoHandler("clip_synthesis"))?;
                task.run(j, logger).await
            }
            QueueJob::Finishing(j) => {
                let task = self.finishing.as_ref().ok_or(WorkerError::NoHandler("finishing"))?;
                task.run(j, logger).await
            }
        }
    }

    /// Logger for a queued job, named after the task that runs it.
    pub fn logger_for(job: &QueueJob) -> JobLogger {
        JobLogger::new(job.job_id(), job.pipeline_id(), job.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgen_models::{AudioResult, FailureKind, JobId};

    #[test]
    fn test_failed_clip_records_failure_and_still_arrives() {
        let failure = FailureDetail::new(FailureKind::RemoteFailed, "nsfw prompt");
        let outcome = TaskOutcome::FanOut(FanOutResult::Clip {
            result: ClipResult::Failed {
                ordinal: 2,
                failure: failure.clone(),
            },
        });

        assert_eq!(outcome.record(), Err(failure));
        assert!(outcome.arrival().is_some());
    }

    #[test]
    fn test_ready_audio_records_payload() {
        let audio = AudioResult {
            url: "https://cdn.example.com/a.mp3".to_string(),
            duration_secs: 120.0,
            image_url: None,
        };
        let outcome = TaskOutcome::FanOut(FanOutResult::Audio {
            outcome: AudioOutcome::Ready { audio: audio.clone() },
        });
        assert_eq!(outcome.record(), Ok(JobPayload::Audio(audio)));
    }

    #[test]
    fn test_finished_outcome_has_no_arrival() {
        let outcome = TaskOutcome::Finished(Err(FailureDetail::new(FailureKind::NoUsableClips, "none")));
        assert!(outcome.arrival().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_without_handler() {
        let job = QueueJob::Finishing(FinishingJob {
            job_id: JobId::new(),
            request: crate::tasks::finishing::tests::request(),
            joined: mvgen_models::JoinedResult::from_arrivals(Vec::new()),
            created_at: chrono::Utc::now(),
        });
        let err = TaskSet::default()
            .dispatch(&job, &TaskSet::logger_for(&job))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NoHandler("finishing")));
    }
}
