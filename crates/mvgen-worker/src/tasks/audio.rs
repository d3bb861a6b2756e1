//! Audio synthesis: submit, poll, keep one rendition.

use async_trait::async_trait;

use mvgen_gateway::{AudioParams, AudioSynthesisClient, Capability};
use mvgen_models::{select_rendition, AudioOutcome, AudioResult, FailureDetail, FailureKind, FanOutResult};
use mvgen_queue::AudioSynthesisJob;

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::polling::{poll_until_terminal, PollEnd, PollPolicy};
use crate::tasks::{PipelineTask, TaskOutcome};

/// Runs audio synthesis jobs against a music capability.
pub struct AudioTask<C = AudioSynthesisClient> {
    capability: C,
    policy: PollPolicy,
}

impl<C> AudioTask<C>
where
    C: Capability<Params = AudioParams, Payload = Vec<AudioResult>>,
{
    pub fn new(capability: C, policy: PollPolicy) -> Self {
        Self { capability, policy }
    }

    /// Drive one job to its terminal outcome.
    pub async fn synthesize(&self, job: &AudioSynthesisJob, logger: &JobLogger) -> AudioOutcome {
        let params = AudioParams {
            prompt: job.lyrics.clone(),
            tags: job.tags.clone(),
            custom_mode: true,
            title: job.title.clone(),
        };

        let token = match self.capability.submit(&params).await {
            Ok(token) => token,
            Err(e) => return failed(FailureKind::SubmissionFailed, e.to_string()),
        };
        logger.log_progress(&format!("submitted as {}", token));

        match poll_until_terminal(&self.capability, &token, &self.policy).await {
            PollEnd::Completed(candidates) => match select_rendition(&candidates) {
                Some(audio) => {
                    logger.log_progress(&format!(
                        "kept rendition {} ({:.1}s of {} candidates)",
                        audio.url,
                        audio.duration_secs,
                        candidates.len()
                    ));
                    AudioOutcome::Ready { audio: audio.clone() }
                }
                None => failed(
                    FailureKind::RemoteFailed,
                    format!("music generation {} completed without a usable rendition", token),
                ),
            },
            PollEnd::Failed(reason) => failed(FailureKind::RemoteFailed, reason),
            PollEnd::TimedOut { elapsed, attempts } => failed(
                FailureKind::PollingTimeout,
                format!(
                    "music generation {} still pending after {}s ({} polls)",
                    token,
                    elapsed.as_secs(),
                    attempts
                ),
            ),
        }
    }
}

fn failed(kind: FailureKind, reason: impl Into<String>) -> AudioOutcome {
    AudioOutcome::Failed {
        failure: FailureDetail::new(kind, reason),
    }
}

#[async_trait]
impl<C> PipelineTask for AudioTask<C>
where
    C: Capability<Params = AudioParams, Payload = Vec<AudioResult>>,
{
    type Job = AudioSynthesisJob;

    fn operation(&self) -> &'static str {
        "audio_synthesis"
    }

    async fn run(&self, job: &AudioSynthesisJob, logger: &JobLogger) -> WorkerResult<TaskOutcome> {
        let outcome = self.synthesize(job, logger).await;
        Ok(TaskOutcome::FanOut(FanOutResult::Audio { outcome }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::tests::Scripted;
    use chrono::Utc;
    use mvgen_gateway::PollOutcome;
    use mvgen_models::JobId;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    type Cap = Scripted<AudioParams, Vec<AudioResult>>;

    fn job() -> AudioSynthesisJob {
        AudioSynthesisJob {
            job_id: JobId::new(),
            pipeline_id: JobId::new(),
            lyrics: "[Verse]\nRain on the window".to_string(),
            tags: "pop,fast,female".to_string(),
            title: "Summer rain".to_string(),
            created_at: Utc::now(),
        }
    }

    fn rendition(url: &str, duration_secs: f64) -> AudioResult {
        AudioResult {
            url: url.to_string(),
            duration_secs,
            image_url: None,
        }
    }

    fn task(cap: Cap) -> AudioTask<Cap> {
        AudioTask::new(cap, PollPolicy::new(Duration::from_secs(30), Duration::from_secs(900)))
    }

    fn logger(job: &AudioSynthesisJob) -> JobLogger {
        JobLogger::new(&job.job_id, &job.pipeline_id, "audio_synthesis")
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_shorter_of_first_two_renditions() {
        let candidates = vec![
            rendition("https://cdn.example.com/long.mp3", 184.2),
            rendition("https://cdn.example.com/short.mp3", 171.0),
            rendition("https://cdn.example.com/shortest.mp3", 90.0),
        ];
        let task = task(Cap::new(2, Some(PollOutcome::Completed(candidates))));
        let job = job();

        let outcome = task.synthesize(&job, &logger(&job)).await;

        assert_eq!(
            outcome,
            AudioOutcome::Ready {
                audio: rendition("https://cdn.example.com/short.mp3", 171.0)
            }
        );
        let params = task.capability.last_params.lock().unwrap().clone().unwrap();
        assert_eq!(params.prompt, job.lyrics);
        assert_eq!(params.tags, "pop,fast,female");
        assert!(params.custom_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_fails_job_without_polling() {
        let task = task(Cap::rejecting());
        let job = job();

        let outcome = task.synthesize(&job, &logger(&job)).await;

        match outcome {
            AudioOutcome::Failed { failure } => assert_eq!(failure.kind, FailureKind::SubmissionFailed),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(task.capability.submits.load(Ordering::SeqCst), 2);
        assert_eq!(task.capability.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_remote_failure() {
        let task = task(Cap::new(u32::MAX, None));
        let job = job();

        let outcome = task.synthesize(&job, &logger(&job)).await;

        match outcome {
            AudioOutcome::Failed { failure } => {
                assert_eq!(failure.kind, FailureKind::PollingTimeout);
                assert!(failure.reason.contains("900s"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_candidates_is_remote_failure() {
        let task = task(Cap::new(0, Some(PollOutcome::Completed(Vec::new()))));
        let job = job();

        let outcome = task.run(&job, &logger(&job)).await.unwrap();

        match outcome {
            TaskOutcome::FanOut(FanOutResult::Audio {
                outcome: AudioOutcome::Failed { failure },
            }) => assert_eq!(failure.kind, FailureKind::RemoteFailed),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
