//! Bookkeeping a job attempt goes through around its task: the status
//! record, the join barrier and the message lifecycle on the stream.

use async_trait::async_trait;

use mvgen_models::{FailureDetail, FanOutResult, GenerationJob, JobId, JobPayload};
use mvgen_queue::{BarrierArrival, PipelineGraph, QueueJob, QueueName, QueueResult};

#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn record(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>>;

    async fn put_record(&self, record: &GenerationJob) -> QueueResult<()>;

    async fn mark_running(&self, job_id: &JobId) -> QueueResult<GenerationJob>;

    /// Returns the stored record, unchanged if it was already terminal.
    async fn mark_succeeded(&self, job_id: &JobId, payload: JobPayload) -> QueueResult<GenerationJob>;

    /// Returns the stored record, unchanged if it was already terminal.
    async fn mark_failed(&self, job_id: &JobId, failure: FailureDetail) -> QueueResult<GenerationJob>;

    async fn report(&self, pipeline_id: &JobId, job_id: &JobId, result: &FanOutResult) -> QueueResult<BarrierArrival>;

    async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()>;

    async fn dead_letter(&self, queue: QueueName, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()>;

    async fn retry_count(&self, message_id: &str) -> QueueResult<u32>;

    /// Count one more failed attempt; returns the new total.
    async fn record_failure(&self, message_id: &str) -> QueueResult<u32>;

    /// Keep a message owned by `consumer` from being claimed as idle.
    async fn touch(&self, queue: QueueName, consumer: &str, message_id: &str) -> QueueResult<()>;

    fn max_retries(&self) -> u32;
}

#[async_trait]
impl JobLedger for PipelineGraph {
    async fn record(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        self.status().get(job_id).await
    }

    async fn put_record(&self, record: &GenerationJob) -> QueueResult<()> {
        self.status().put(record).await
    }

    async fn mark_running(&self, job_id: &JobId) -> QueueResult<GenerationJob> {
        self.status().mark_running(job_id).await
    }

    async fn mark_succeeded(&self, job_id: &JobId, payload: JobPayload) -> QueueResult<GenerationJob> {
        self.status().mark_succeeded(job_id, payload).await
    }

    async fn mark_failed(&self, job_id: &JobId, failure: FailureDetail) -> QueueResult<GenerationJob> {
        self.status().mark_failed(job_id, failure).await
    }

    async fn report(&self, pipeline_id: &JobId, job_id: &JobId, result: &FanOutResult) -> QueueResult<BarrierArrival> {
        PipelineGraph::report(self, pipeline_id, job_id, result).await
    }

    async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()> {
        self.queue().ack(queue, message_id).await
    }

    async fn dead_letter(&self, queue: QueueName, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        self.queue().dlq(queue, message_id, job, error).await
    }

    async fn retry_count(&self, message_id: &str) -> QueueResult<u32> {
        self.queue().get_retry_count(message_id).await
    }

    async fn record_failure(&self, message_id: &str) -> QueueResult<u32> {
        self.queue().increment_retry(message_id).await
    }

    async fn touch(&self, queue: QueueName, consumer: &str, message_id: &str) -> QueueResult<()> {
        self.queue().touch(queue, consumer, message_id).await
    }

    fn max_retries(&self) -> u32 {
        self.queue().max_retries()
    }
}
