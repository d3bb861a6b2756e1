//! Job queues on Redis Streams.
//!
//! One stream per [`QueueName`], one shared consumer group, and a dead-letter
//! stream per queue.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::config::{QueueConfig, QueueName};
use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// A delivered message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub job: QueueJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group on every queue stream.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        for queue in QueueName::ALL {
            let stream = self.config.stream(queue);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Check that Redis answers.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(QueueError::connection_failed(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }

    /// Enqueue a job on its queue.
    ///
    /// Fails with [`QueueError::Duplicate`] if a job with the same idempotency
    /// key was enqueued within the dedup window.
    pub async fn enqueue(&self, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        let dedup_key = self.config.key(&["dedup", &idempotency_key]);
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let stream = self.config.stream(job.queue());
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Release the marker so the enqueue can be retried.
                let _: Result<(), _> = conn.del(&dedup_key).await;
                return Err(QueueError::enqueue_failed(format!("XADD {}: {}", stream, e)));
            }
        };

        info!(
            job_id = %job.job_id(),
            queue = %job.queue(),
            "Enqueued job with message ID {}",
            message_id
        );

        Ok(message_id)
    }

    /// Acknowledge and delete a message.
    pub async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let stream = self.config.stream(queue);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        let _: () = conn.del(self.retry_key(message_id)).await?;

        debug!("Acknowledged {} message {}", queue, message_id);
        Ok(())
    }

    /// Move a message to the queue's dead-letter stream.
    pub async fn dlq(&self, queue: QueueName, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(self.config.dlq_stream(queue))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(queue, message_id).await?;

        warn!(job_id = %job.job_id(), queue = %queue, "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Stream length.
    pub async fn len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(self.config.stream(queue)).await?)
    }

    /// Dead-letter stream length.
    pub async fn dlq_len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(self.config.dlq_stream(queue)).await?)
    }

    /// Read new messages for `consumer_name`, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        queue: QueueName,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.config.stream(queue))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(delivery) = self.decode_entry(queue, entry.id, &entry.map).await {
                    deliveries.push(delivery);
                }
            }
        }

        Ok(deliveries)
    }

    /// Claim messages idle longer than `min_idle_ms`, e.g. from crashed workers.
    pub async fn claim_pending(
        &self,
        queue: QueueName,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;
        let stream = self.config.stream(queue);

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for entry in result.claimed {
            if let Some(delivery) = self.decode_entry(queue, entry.id, &entry.map).await {
                info!(job_id = %delivery.job.job_id(), queue = %queue, "Claimed pending job");
                deliveries.push(delivery);
            }
        }

        Ok(deliveries)
    }

    /// Reset the idle time of a message still being processed, so long poll
    /// loops are not claimed by another consumer.
    pub async fn touch(&self, queue: QueueName, consumer_name: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XCLAIM")
            .arg(self.config.stream(queue))
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn decode_entry(
        &self,
        queue: QueueName,
        message_id: String,
        map: &std::collections::HashMap<String, redis::Value>,
    ) -> Option<Delivery> {
        let payload = match map.get("job") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => {
                warn!("Message {} on {} has no job payload", message_id, queue);
                self.ack(queue, &message_id).await.ok();
                return None;
            }
        };

        match serde_json::from_str::<QueueJob>(&payload) {
            Ok(job) => Some(Delivery { message_id, job }),
            Err(e) => {
                warn!("Failed to parse job payload on {}: {}", queue, e);
                // Malformed messages would be redelivered forever.
                self.ack(queue, &message_id).await.ok();
                None
            }
        }
    }

    fn retry_key(&self, message_id: &str) -> String {
        self.config.key(&["retry", message_id])
    }

    /// Failed attempts recorded for a message.
    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;
        let count: Option<u32> = conn.get(self.retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Record one more failed attempt.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;
        let key = self.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
