//! Blocking poll loop over a remote capability.
//!
//! The loop owns its wall-clock budget. It occupies the calling task for the
//! whole remote job, sleeping between status requests.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use mvgen_gateway::{Capability, JobToken, PollOutcome};

use crate::metrics;

/// Interval and overall budget of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEnd<T> {
    Completed(T),
    Failed(String),
    TimedOut { elapsed: Duration, attempts: u32 },
}

/// Poll `token` until the service reports a terminal state or the budget runs out.
///
/// The first status request is sent immediately. A request that cannot be
/// read counts as pending for that cycle.
pub async fn poll_until_terminal<C>(capability: &C, token: &JobToken, policy: &PollPolicy) -> PollEnd<C::Payload>
where
    C: Capability + ?Sized,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        metrics::record_poll(capability.name());

        match capability.poll(token).await {
            PollOutcome::Completed(payload) => return PollEnd::Completed(payload),
            PollOutcome::Failed(reason) => return PollEnd::Failed(reason),
            PollOutcome::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return PollEnd::TimedOut {
                elapsed: now - started,
                attempts,
            };
        }

        debug!(
            service = capability.name(),
            token = %token,
            attempt = attempts,
            "Remote job pending"
        );
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}
