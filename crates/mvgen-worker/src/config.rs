//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mvgen_media::{RenderOptions, DEFAULT_ATOMIC_UNIT_SECS};
use mvgen_queue::QueueName;

use crate::error::{WorkerError, WorkerResult};
use crate::polling::PollPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues consumed by this process
    pub queues: Vec<QueueName>,
    /// Maximum concurrent jobs per queue
    pub max_concurrent_jobs: usize,
    /// How long one XREADGROUP call blocks
    pub consume_block: Duration,
    /// How often to scan for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// First backoff delay between attempts of a failing job
    pub retry_base_delay: Duration,
    /// Backoff ceiling
    pub retry_max_delay: Duration,
    /// Port of the Prometheus listener; `None` disables it
    pub metrics_port: Option<u16>,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Audio synthesis polling
    pub audio_poll: PollPolicy,
    /// Clip synthesis polling
    pub clip_poll: PollPolicy,
    /// Native length of one downloaded clip (seconds)
    pub atomic_unit_secs: f64,
    /// Output geometry and ffmpeg step timeout
    pub render: RenderOptions,
    /// Maximum concurrent clip downloads per finishing job
    pub download_concurrency: usize,
    /// Timeout of one download
    pub download_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: QueueName::ALL.to_vec(),
            max_concurrent_jobs: 8,
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(60),
            metrics_port: None,
            work_dir: PathBuf::from("/tmp/mvgen"),
            audio_poll: PollPolicy::new(Duration::from_secs(30), Duration::from_secs(15 * 60)),
            clip_poll: PollPolicy::new(Duration::from_secs(15), Duration::from_secs(30 * 60)),
            atomic_unit_secs: DEFAULT_ATOMIC_UNIT_SECS,
            render: RenderOptions::default(),
            download_concurrency: 4,
            download_timeout: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let queues = match std::env::var("WORKER_QUEUES") {
            Ok(list) => QueueName::parse_list(&list).map_err(|e| WorkerError::config_error(e.to_string()))?,
            Err(_) => defaults.queues,
        };

        let config = Self {
            queues,
            max_concurrent_jobs: env_or("WORKER_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            consume_block: defaults.consume_block,
            claim_interval: secs_or("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            claim_min_idle: secs_or("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle),
            shutdown_timeout: secs_or("WORKER_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
            retry_base_delay: defaults.retry_base_delay,
            retry_max_delay: defaults.retry_max_delay,
            metrics_port: std::env::var("WORKER_METRICS_PORT").ok().and_then(|s| s.parse().ok()),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            audio_poll: PollPolicy::new(
                secs_or("AUDIO_POLL_INTERVAL_SECS", defaults.audio_poll.interval),
                secs_or("AUDIO_POLL_TIMEOUT_SECS", defaults.audio_poll.timeout),
            ),
            clip_poll: PollPolicy::new(
                secs_or("CLIP_POLL_INTERVAL_SECS", defaults.clip_poll.interval),
                secs_or("CLIP_POLL_TIMEOUT_SECS", defaults.clip_poll.timeout),
            ),
            atomic_unit_secs: env_or("ASSEMBLY_ATOMIC_UNIT_SECS", defaults.atomic_unit_secs),
            render: RenderOptions {
                width: env_or("ASSEMBLY_WIDTH", defaults.render.width),
                height: env_or("ASSEMBLY_HEIGHT", defaults.render.height),
                fps: env_or("ASSEMBLY_FPS", defaults.render.fps),
                step_timeout_secs: env_or("ASSEMBLY_STEP_TIMEOUT_SECS", defaults.render.step_timeout_secs),
            },
            download_concurrency: env_or("FINISHING_DOWNLOAD_CONCURRENCY", defaults.download_concurrency),
            download_timeout: secs_or("FINISHING_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
        };

        config.check()?;
        Ok(config)
    }

    /// Reject settings the executor cannot run with.
    pub fn check(&self) -> WorkerResult<()> {
        if self.queues.is_empty() {
            return Err(WorkerError::config_error("WORKER_QUEUES names no queue"));
        }
        if self.max_concurrent_jobs == 0 || self.download_concurrency == 0 {
            return Err(WorkerError::config_error("concurrency limits must be at least 1"));
        }
        if !(self.atomic_unit_secs.is_finite() && self.atomic_unit_secs > 0.0) {
            return Err(WorkerError::config_error("ASSEMBLY_ATOMIC_UNIT_SECS must be positive"));
        }
        if self.render.fps == 0 || self.render.width == 0 || self.render.height == 0 {
            return Err(WorkerError::config_error("assembly geometry must be non-zero"));
        }
        for policy in [&self.audio_poll, &self.clip_poll] {
            if policy.interval.is_zero() {
                return Err(WorkerError::config_error("poll intervals must be non-zero"));
            }
        }
        Ok(())
    }

    /// Whether this process consumes `queue`.
    pub fn consumes(&self, queue: QueueName) -> bool {
        self.queues.contains(&queue)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn secs_or(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
