//! Handling of one delivered message: status record, task, barrier, ack.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use mvgen_models::{
    AudioOutcome, ClipResult, FailureDetail, FanOutResult, GenerationJob, JobPayload,
};
use mvgen_queue::{BarrierArrival, Delivery, QueueJob, QueueName};

use crate::error::{WorkerError, WorkerResult};
use crate::ledger::JobLedger;
use crate::logging::JobLogger;
use crate::metrics;
use crate::tasks::{TaskOutcome, TaskSet};

/// Exponential backoff between attempts of a failing job.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay after the `failures`-th failed attempt (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

/// Where an attempt left the job before its outcome was recorded.
enum Progress {
    /// The record was already terminal; its arrival was re-reported.
    Skipped,
    /// The task ran to this outcome.
    Ran(TaskOutcome),
}

/// Runs delivered jobs to completion, retrying attempt failures.
pub struct JobHandler {
    ledger: Arc<dyn JobLedger>,
    tasks: TaskSet,
    backoff: Backoff,
    consumer_name: String,
    heartbeat_interval: Duration,
}

impl JobHandler {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        tasks: TaskSet,
        backoff: Backoff,
        consumer_name: impl Into<String>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            tasks,
            backoff,
            consumer_name: consumer_name.into(),
            heartbeat_interval,
        }
    }

    /// Process one message. Never returns an error: the message ends acked,
    /// dead-lettered, or pending for redelivery.
    pub async fn handle(&self, queue: QueueName, delivery: Delivery) {
        let logger = TaskSet::logger_for(&delivery.job);
        let span = logger.create_span();
        self.handle_inner(queue, delivery, logger).instrument(span).await
    }

    async fn handle_inner(&self, queue: QueueName, delivery: Delivery, logger: JobLogger) {
        let Delivery { message_id, job } = delivery;
        let kind = job.kind().as_str();
        let started = Instant::now();

        metrics::record_job_started(kind);
        logger.log_start(&format!("message {} on {}", message_id, queue));

        let heartbeat = self.spawn_heartbeat(queue, &message_id);

        let max_retries = self.ledger.max_retries();
        let mut failures = self.ledger.retry_count(&message_id).await.unwrap_or(0);
        // Once the task has run, later attempts only record and report its outcome.
        let mut outcome: Option<TaskOutcome> = None;
        let result = loop {
            let step = match outcome.take() {
                Some(done) => {
                    let settled = self.settle(&job, &done, &logger).await;
                    outcome = Some(done);
                    settled
                }
                None => match self.execute(&job, &logger).await {
                    Ok(Progress::Skipped) => Ok("skipped"),
                    Ok(Progress::Ran(done)) => {
                        let settled = self.settle(&job, &done, &logger).await;
                        outcome = Some(done);
                        settled
                    }
                    Err(e) => Err(e),
                },
            };

            match step {
                Ok(label) => break Ok(label),
                Err(e) => {
                    metrics::record_attempt_failed(kind);
                    failures = self.ledger.record_failure(&message_id).await.unwrap_or(failures + 1);
                    if !e.is_retryable() || failures >= max_retries {
                        break Err(e);
                    }
                    let delay = self.backoff.delay(failures);
                    logger.log_warning(&format!(
                        "attempt {}/{} failed, retrying in {}s: {}",
                        failures,
                        max_retries,
                        delay.as_secs(),
                        e
                    ));
                    tokio::time::sleep(delay).await;
                }
            }
        };

        heartbeat.abort();

        match result {
            Ok(label) => {
                if let Err(e) = self.ledger.ack(queue, &message_id).await {
                    // Left pending; the terminal record makes redelivery a no-op.
                    logger.log_error(&format!("failed to ack message {}: {}", message_id, e));
                }
                metrics::record_job_finished(kind, label, started.elapsed().as_secs_f64());
            }
            Err(e) => {
                logger.log_error(&format!("giving up after {} failed attempts: {}", failures, e));
                let label = self.exhaust(queue, &message_id, &job, outcome.as_ref(), &e, &logger).await;
                metrics::record_dead_lettered(kind);
                metrics::record_job_finished(kind, label, started.elapsed().as_secs_f64());
            }
        }
    }

    /// Everything up to and including the task run.
    async fn execute(&self, job: &QueueJob, logger: &JobLogger) -> WorkerResult<Progress> {
        let job_id = job.job_id();

        match self.ledger.record(job_id).await? {
            Some(record) if record.is_terminal() => {
                logger.log_progress(&format!("record already {}, not re-running", record.status.as_str()));
                if let Some(arrival) = arrival_from_record(job, &record) {
                    self.ledger.report(job.pipeline_id(), job_id, &arrival).await?;
                }
                return Ok(Progress::Skipped);
            }
            Some(_) => {}
            None => {
                logger.log_warning("job record missing, recreating it");
                self.ledger.put_record(&record_for(job)).await?;
            }
        }

        self.ledger.mark_running(job_id).await?;
        let outcome = self.tasks.dispatch(job, logger).await?;
        Ok(Progress::Ran(outcome))
    }

    /// Record a task outcome and report the stored record to the barrier.
    /// Returns the outcome label for metrics.
    async fn settle(&self, job: &QueueJob, outcome: &TaskOutcome, logger: &JobLogger) -> WorkerResult<&'static str> {
        let job_id = job.job_id();
        let record = match outcome.record() {
            Ok(payload) => self.ledger.mark_succeeded(job_id, payload).await?,
            Err(failure) => self.ledger.mark_failed(job_id, failure).await?,
        };

        if let Some(arrival) = arrival_from_record(job, &record) {
            match self.ledger.report(job.pipeline_id(), job_id, &arrival).await? {
                BarrierArrival::Waiting { arrived, expected } => {
                    logger.log_progress(&format!("barrier at {}/{}", arrived, expected));
                }
                BarrierArrival::Complete(_) => logger.log_progress("last arrival, finishing job dispatched"),
                BarrierArrival::AlreadyDispatched => logger.log_progress("finishing job was already dispatched"),
            }
        }

        let label = record.status.as_str();
        logger.log_completion(label);
        Ok(label)
    }

    /// Store a terminal record, release the barrier slot and dead-letter the
    /// message. Returns the label of the stored record.
    async fn exhaust(
        &self,
        queue: QueueName,
        message_id: &str,
        job: &QueueJob,
        outcome: Option<&TaskOutcome>,
        error: &WorkerError,
        logger: &JobLogger,
    ) -> &'static str {
        let job_id = job.job_id();
        let failure = error.failure_detail();
        let recorded = match outcome.map(TaskOutcome::record).unwrap_or_else(|| Err(failure.clone())) {
            Ok(payload) => self.ledger.mark_succeeded(job_id, payload).await,
            Err(detail) => self.ledger.mark_failed(job_id, detail).await,
        };

        let (arrival, label) = match recorded {
            Ok(record) => {
                let label = if record.is_terminal() { record.status.as_str() } else { "failed" };
                (arrival_from_record(job, &record), label)
            }
            Err(e) => {
                logger.log_error(&format!("failed to record final state: {}", e));
                let arrival = outcome
                    .and_then(TaskOutcome::arrival)
                    .cloned()
                    .or_else(|| sentinel_for(job, failure));
                (arrival, "failed")
            }
        };

        if let Some(arrival) = arrival {
            if let Err(e) = self.ledger.report(job.pipeline_id(), job_id, &arrival).await {
                logger.log_error(&format!("failed to report to the barrier: {}", e));
            }
        }

        if let Err(e) = self.ledger.dead_letter(queue, message_id, job, &error.to_string()).await {
            logger.log_error(&format!("failed to dead-letter message {}: {}", message_id, e));
        }

        label
    }

    fn spawn_heartbeat(&self, queue: QueueName, message_id: &str) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(&self.ledger);
        let consumer = self.consumer_name.clone();
        let message_id = message_id.to_string();
        let period = self.heartbeat_interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = ledger.touch(queue, &consumer, &message_id).await {
                    tracing::warn!("Heartbeat for message {} failed: {}", message_id, e);
                }
            }
        })
    }
}

/// Fresh pending record for a job whose record expired.
fn record_for(job: &QueueJob) -> GenerationJob {
    let record = GenerationJob::new(job.job_id().clone(), job.pipeline_id().clone(), job.kind());
    match job {
        QueueJob::ClipSynthesis(j) => record.with_ordinal(j.ordinal),
        _ => record,
    }
}

/// Barrier arrival rebuilt from a terminal record.
pub fn arrival_from_record(job: &QueueJob, record: &GenerationJob) -> Option<FanOutResult> {
    match (job, &record.result, &record.failure) {
        (QueueJob::AudioSynthesis(_), Some(JobPayload::Audio(audio)), _) => Some(FanOutResult::Audio {
            outcome: AudioOutcome::Ready { audio: audio.clone() },
        }),
        (QueueJob::ClipSynthesis(_), Some(JobPayload::Clip(result)), _) => Some(FanOutResult::Clip {
            result: result.clone(),
        }),
        (_, _, Some(failure)) => sentinel_for(job, failure.clone()),
        _ => None,
    }
}

/// Failure sentinel a fan-out job delivers to the barrier.
pub fn sentinel_for(job: &QueueJob, failure: FailureDetail) -> Option<FanOutResult> {
    match job {
        QueueJob::AudioSynthesis(_) => Some(FanOutResult::Audio {
            outcome: AudioOutcome::Failed { failure },
        }),
        QueueJob::ClipSynthesis(j) => Some(FanOutResult::Clip {
            result: ClipResult::Failed {
                ordinal: j.ordinal,
                failure,
            },
        }),
        QueueJob::Finishing(_) => None,
    }
}
