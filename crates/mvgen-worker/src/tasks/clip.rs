//! Clip synthesis for one lyric line.
//!
//! Every ending of the poll loop is a terminal `ClipResult`. A failed clip
//! becomes a sentinel tagged with its ordinal so the barrier still completes
//! and siblings are unaffected.

use async_trait::async_trait;

use mvgen_gateway::{Capability, ClipParams, ClipSynthesisClient};
use mvgen_models::{ClipResult, FailureDetail, FailureKind, FanOutResult};
use mvgen_queue::ClipSynthesisJob;

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::polling::{poll_until_terminal, PollEnd, PollPolicy};
use crate::tasks::{PipelineTask, TaskOutcome};

pub struct ClipTask<C = ClipSynthesisClient> {
    capability: C,
    policy: PollPolicy,
    /// Clip length requested from the service (seconds)
    clip_duration_secs: u32,
}

impl<C> ClipTask<C>
where
    C: Capability<Params = ClipParams, Payload = String>,
{
    pub fn new(capability: C, policy: PollPolicy, clip_duration_secs: u32) -> Self {
        Self {
            capability,
            policy,
            clip_duration_secs,
        }
    }

    pub async fn synthesize(&self, job: &ClipSynthesisJob, logger: &JobLogger) -> ClipResult {
        let ordinal = job.ordinal;
        let failed = |kind: FailureKind, reason: String| ClipResult::Failed {
            ordinal,
            failure: FailureDetail::new(kind, reason),
        };

        let params = ClipParams {
            prompt: job.prompt.clone(),
            style: job.style.clone(),
            duration: self.clip_duration_secs,
        };

        let token = match self.capability.submit(&params).await {
            Ok(token) => token,
            Err(e) => return failed(FailureKind::SubmissionFailed, e.to_string()),
        };
        logger.log_progress(&format!("line {} submitted as {}", ordinal, token));

        match poll_until_terminal(&self.capability, &token, &self.policy).await {
            PollEnd::Completed(url) => ClipResult::Ready { ordinal, url },
            PollEnd::Failed(reason) => failed(FailureKind::RemoteFailed, reason),
            PollEnd::TimedOut { elapsed, attempts } => failed(
                FailureKind::PollingTimeout,
                format!(
                    "clip generation {} still pending after {}s ({} polls)",
                    token,
                    elapsed.as_secs(),
                    attempts
                ),
            ),
        }
    }
}

#[async_trait]
impl<C> PipelineTask for ClipTask<C>
where
    C: Capability<Params = ClipParams, Payload = String>,
{
    type Job = ClipSynthesisJob;

    fn operation(&self) -> &'static str {
        "clip_synthesis"
    }

    async fn run(&self, job: &ClipSynthesisJob, logger: &JobLogger) -> WorkerResult<TaskOutcome> {
        let result = self.synthesize(job, logger).await;
        if let ClipResult::Failed { failure, .. } = &result {
            logger.log_failure(&format!("line {} discarded: {}", job.ordinal, failure));
        }
        Ok(TaskOutcome::FanOut(FanOutResult::Clip { result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::tests::Scripted;
    use chrono::Utc;
    use mvgen_gateway::PollOutcome;
    use mvgen_models::JobId;
    use std::time::Duration;

    type Cap = Scripted<ClipParams, String>;

    fn job(ordinal: u32) -> ClipSynthesisJob {
        ClipSynthesisJob {
            job_id: JobId::new(),
            pipeline_id: JobId::new(),
            ordinal,
            line: "Rain on the window".to_string(),
            prompt: "anime music video scene for the song \"Summer rain\": Rain on the window".to_string(),
            style: "anime".to_string(),
            created_at: Utc::now(),
        }
    }

    fn task(cap: Cap) -> ClipTask<Cap> {
        ClipTask::new(cap, PollPolicy::new(Duration::from_secs(15), Duration::from_secs(1800)), 5)
    }

    fn logger(job: &ClipSynthesisJob) -> JobLogger {
        JobLogger::new(&job.job_id, &job.pipeline_id, "clip_synthesis")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_keeps_ordinal() {
        let task = task(Cap::new(4, Some(PollOutcome::Completed("https://cdn.example.com/c3.mp4".to_string()))));
        let job = job(3);

        let result = task.synthesize(&job, &logger(&job)).await;

        assert_eq!(
            result,
            ClipResult::Ready {
                ordinal: 3,
                url: "https://cdn.example.com/c3.mp4".to_string()
            }
        );
        let params = task.capability.last_params.lock().unwrap().clone().unwrap();
        assert_eq!(params.duration, 5);
        assert_eq!(params.style, "anime");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_becomes_sentinel() {
        let task = task(Cap::new(0, Some(PollOutcome::Failed("moderation".to_string()))));
        let job = job(1);

        let outcome = task.run(&job, &logger(&job)).await.unwrap();

        match outcome {
            TaskOutcome::FanOut(FanOutResult::Clip {
                result: ClipResult::Failed { ordinal, failure },
            }) => {
                assert_eq!(ordinal, 1);
                assert_eq!(failure.kind, FailureKind::RemoteFailed);
                assert_eq!(failure.reason, "moderation");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_sentinel() {
        let task = task(Cap::new(u32::MAX, None));
        let job = job(0);

        let result = task.synthesize(&job, &logger(&job)).await;

        assert!(matches!(
            result,
            ClipResult::Failed { ordinal: 0, ref failure } if failure.kind == FailureKind::PollingTimeout
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_becomes_sentinel() {
        let task = task(Cap::rejecting());
        let job = job(2);

        let result = task.synthesize(&job, &logger(&job)).await;

        assert!(matches!(
            result,
            ClipResult::Failed { ordinal: 2, ref failure } if failure.kind == FailureKind::SubmissionFailed
        ));
    }
}
