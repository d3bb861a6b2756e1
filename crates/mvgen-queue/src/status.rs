//! Job status records in Redis.
//!
//! Each job has one JSON record. Records are created by the orchestrator and
//! afterwards written only by the worker executing the job.

use redis::AsyncCommands;
use tracing::debug;

use mvgen_models::{FailureDetail, GenerationJob, JobId, JobPayload};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Store for [`GenerationJob`] records.
pub struct JobStatusStore {
    client: redis::Client,
    config: QueueConfig,
}

impl JobStatusStore {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    fn record_key(&self, job_id: &JobId) -> String {
        self.config.key(&["job", job_id.as_str()])
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Write records for a whole pipeline in one round trip.
    pub async fn create_all(&self, jobs: &[GenerationJob]) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for job in jobs {
            let payload = serde_json::to_string(job)?;
            match self.config.record_ttl_secs {
                Some(ttl) => pipe.set_ex(self.record_key(&job.id), payload, ttl).ignore(),
                None => pipe.set(self.record_key(&job.id), payload).ignore(),
            };
        }
        pipe.query_async::<()>(&mut conn).await?;
        debug!("Created {} job records", jobs.len());
        Ok(())
    }

    /// Overwrite one record.
    pub async fn put(&self, job: &GenerationJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        let key = self.record_key(&job.id);
        match self.config.record_ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, payload, ttl).await?,
            None => conn.set::<_, _, ()>(key, payload).await?,
        }
        Ok(())
    }

    /// Read a record; `None` for ids never submitted.
    pub async fn get(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.record_key(job_id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }

    /// Apply a transition and persist it; terminal records are returned unchanged.
    async fn transition<F>(&self, job_id: &JobId, apply: F) -> QueueResult<GenerationJob>
    where
        F: FnOnce(GenerationJob) -> GenerationJob,
    {
        let current = self
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        if current.is_terminal() {
            return Ok(current);
        }
        let next = apply(current);
        self.put(&next).await?;
        Ok(next)
    }

    pub async fn mark_running(&self, job_id: &JobId) -> QueueResult<GenerationJob> {
        self.transition(job_id, GenerationJob::start).await
    }

    pub async fn mark_succeeded(&self, job_id: &JobId, payload: JobPayload) -> QueueResult<GenerationJob> {
        self.transition(job_id, |job| job.succeed(payload)).await
    }

    pub async fn mark_failed(&self, job_id: &JobId, failure: FailureDetail) -> QueueResult<GenerationJob> {
        self.transition(job_id, |job| job.fail(failure)).await
    }
}
