//! Queue configuration and queue names.

use std::fmt;
use std::str::FromStr;

use mvgen_models::JobKind;

use crate::error::QueueError;

/// Named queues, one per job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Audio,
    Clip,
    Finishing,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Audio, QueueName::Clip, QueueName::Finishing];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Audio => "audio",
            QueueName::Clip => "clip",
            QueueName::Finishing => "finishing",
        }
    }

    /// Queue serving jobs of `kind`.
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::AudioSynthesis => QueueName::Audio,
            JobKind::ClipSynthesis => QueueName::Clip,
            JobKind::Finishing => QueueName::Finishing,
        }
    }

    /// Parse a comma-separated list such as `audio,clip`.
    pub fn parse_list(list: &str) -> Result<Vec<QueueName>, QueueError> {
        let mut queues = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let queue: QueueName = name.parse()?;
            if !queues.contains(&queue) {
                queues.push(queue);
            }
        }
        if queues.is_empty() {
            return Err(QueueError::InvalidConfig("no queue names given".to_string()));
        }
        Ok(queues)
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(QueueName::Audio),
            "clip" => Ok(QueueName::Clip),
            "finishing" => Ok(QueueName::Finishing),
            other => Err(QueueError::InvalidConfig(format!("unknown queue '{}'", other))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every Redis key
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Max delivery attempts before the dead-letter stream
    pub max_retries: u32,
    /// TTL of enqueue dedup markers (seconds)
    pub dedup_ttl_secs: u64,
    /// TTL of job records; `None` keeps them until reaped
    pub record_ttl_secs: Option<u64>,
    /// TTL of barrier state (seconds)
    pub barrier_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "mvgen".to_string(),
            consumer_group: "mvgen:workers".to_string(),
            max_retries: 3,
            dedup_ttl_secs: 86400,
            record_ttl_secs: None,
            barrier_ttl_secs: 2 * 86400,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            max_retries: std::env::var("WORKER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            dedup_ttl_secs: defaults.dedup_ttl_secs,
            record_ttl_secs: std::env::var("JOB_RECORD_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ttl| *ttl > 0),
            barrier_ttl_secs: std::env::var("BARRIER_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.barrier_ttl_secs),
        }
    }

    pub fn stream(&self, queue: QueueName) -> String {
        format!("{}:stream:{}", self.key_prefix, queue)
    }

    pub fn dlq_stream(&self, queue: QueueName) -> String {
        format!("{}:dlq:{}", self.key_prefix, queue)
    }

    pub(crate) fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_list() {
        assert_eq!(
            QueueName::parse_list("audio, clip,audio").unwrap(),
            vec![QueueName::Audio, QueueName::Clip]
        );
        assert!(QueueName::parse_list("").is_err());
        assert!(QueueName::parse_list("audio,video").is_err());
    }

    #[test]
    fn test_key_layout() {
        let config = QueueConfig::default();
        assert_eq!(config.stream(QueueName::Finishing), "mvgen:stream:finishing");
        assert_eq!(config.dlq_stream(QueueName::Clip), "mvgen:dlq:clip");
        assert_eq!(config.key(&["job", "abc"]), "mvgen:job:abc");
    }

    #[test]
    fn test_queue_for_kind() {
        assert_eq!(QueueName::for_kind(JobKind::ClipSynthesis), QueueName::Clip);
        assert_eq!(QueueName::for_kind(JobKind::Finishing), QueueName::Finishing);
    }
}
