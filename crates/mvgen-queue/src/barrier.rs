//! Join barrier for the fan-out jobs of one pipeline.
//!
//! The barrier holds the expected member count, the request, and a hash of
//! terminal results keyed by job id. Arrival order does not matter; a repeated
//! arrival overwrites its own field. The arrival that completes the set is
//! told so exactly until the finishing job is marked dispatched.

use std::collections::HashMap;

use redis::AsyncCommands;
use tracing::{debug, info};

use mvgen_models::{FanOutResult, GenerationRequest, JobId, JoinedResult};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::FinishingJob;

/// KEYS[1] results hash, KEYS[2] meta hash.
/// ARGV[1] job id, ARGV[2] result JSON, ARGV[3] ttl seconds.
/// Returns {arrived, expected, complete}.
const ARRIVE_SCRIPT: &str = r#"
local expected = tonumber(redis.call('HGET', KEYS[2], 'expected'))
if not expected then
  return redis.error_reply('BARRIER_MISSING')
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[3]))
local arrived = redis.call('HLEN', KEYS[1])
local dispatched = redis.call('HGET', KEYS[2], 'dispatched')
local complete = 0
if arrived >= expected and dispatched ~= '1' then
  complete = 1
end
return {arrived, expected, complete}
"#;

/// Outcome of one arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum BarrierArrival {
    /// Other members are still running.
    Waiting { arrived: u64, expected: u64 },
    /// Every member is terminal; the finishing job is ready to enqueue.
    Complete(Box<FinishingJob>),
    /// Every member is terminal and the finishing job was already dispatched.
    AlreadyDispatched,
}

/// Redis-backed join barrier.
pub struct JoinBarrier {
    client: redis::Client,
    config: QueueConfig,
    script: redis::Script,
}

impl JoinBarrier {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            script: redis::Script::new(ARRIVE_SCRIPT),
        })
    }

    fn meta_key(&self, pipeline_id: &JobId) -> String {
        self.config.key(&["barrier", pipeline_id.as_str(), "meta"])
    }

    fn results_key(&self, pipeline_id: &JobId) -> String {
        self.config.key(&["barrier", pipeline_id.as_str(), "results"])
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Open the barrier before any member is enqueued.
    pub async fn open(&self, pipeline_id: &JobId, expected: usize, request: &GenerationRequest) -> QueueResult<()> {
        if expected == 0 {
            return Err(QueueError::barrier("a barrier needs at least one member"));
        }

        let mut conn = self.connection().await?;
        let key = self.meta_key(pipeline_id);
        let request = serde_json::to_string(request)?;

        redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[
                    ("expected", expected.to_string()),
                    ("dispatched", "0".to_string()),
                    ("request", request),
                ],
            )
            .ignore()
            .expire(&key, self.config.barrier_ttl_secs as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(pipeline_id = %pipeline_id, expected, "Opened barrier");
        Ok(())
    }

    /// Store a member's terminal result and report whether the set is complete.
    pub async fn arrive(&self, pipeline_id: &JobId, job_id: &JobId, result: &FanOutResult) -> QueueResult<BarrierArrival> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(result)?;

        let (arrived, expected, complete): (u64, u64, u8) = self
            .script
            .key(self.results_key(pipeline_id))
            .key(self.meta_key(pipeline_id))
            .arg(job_id.as_str())
            .arg(payload)
            .arg(self.config.barrier_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                if e.to_string().contains("BARRIER_MISSING") {
                    QueueError::barrier(format!("no barrier open for pipeline {}", pipeline_id))
                } else {
                    QueueError::Redis(e)
                }
            })?;

        debug!(pipeline_id = %pipeline_id, job_id = %job_id, arrived, expected, "Barrier arrival");

        if arrived < expected {
            return Ok(BarrierArrival::Waiting { arrived, expected });
        }
        if complete == 0 {
            return Ok(BarrierArrival::AlreadyDispatched);
        }

        let job = self.finishing_job(&mut conn, pipeline_id).await?;
        info!(
            pipeline_id = %pipeline_id,
            clips = job.joined.clips.len(),
            failed_clips = job.joined.failed_clip_count(),
            "Barrier complete"
        );
        Ok(BarrierArrival::Complete(Box::new(job)))
    }

    async fn finishing_job(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        pipeline_id: &JobId,
    ) -> QueueResult<FinishingJob> {
        let request: Option<String> = conn.hget(self.meta_key(pipeline_id), "request").await?;
        let request: GenerationRequest = serde_json::from_str(
            &request.ok_or_else(|| QueueError::barrier(format!("barrier {} lost its request", pipeline_id)))?,
        )?;

        let arrivals: HashMap<String, String> = conn.hgetall(self.results_key(pipeline_id)).await?;
        let results = arrivals
            .values()
            .map(|raw| serde_json::from_str::<FanOutResult>(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FinishingJob::new(pipeline_id.clone(), request, JoinedResult::from_arrivals(results)))
    }

    /// Record that the finishing job is on its queue.
    pub async fn mark_dispatched(&self, pipeline_id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(self.meta_key(pipeline_id), "dispatched", "1").await?;
        Ok(())
    }
}

