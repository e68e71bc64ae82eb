//! Retry wrapper around a [`ProbeExecutor`]

use crate::proxy::executor::ProbeExecutor;
use crate::proxy::models::{ProbeOutcome, ProxyDescriptor};
use std::time::Duration;
use tracing::debug;

/// Default number of additional attempts after the first
pub const DEFAULT_RETRIES: u32 = 2;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub retries: u32,
    /// Pause between attempts; not covered by the probe timeout
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Per-proxy retry state
#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    RetryScheduled { attempt: u32 },
    Succeeded(ProbeOutcome),
    /// Budget spent; holds the last failed attempt
    Exhausted(ProbeOutcome),
    /// Failure that another attempt cannot fix
    Rejected(ProbeOutcome),
}

/// Probe `descriptor` until it succeeds, fails non-retryably, or the budget
/// runs out. Exactly one outcome is returned; its `attempts` field counts the
/// executor calls made.
pub async fn probe_with_retry<E>(
    executor: &E,
    descriptor: &ProxyDescriptor,
    raw_proxy: &str,
    policy: RetryPolicy,
) -> ProbeOutcome
where
    E: ProbeExecutor + ?Sized,
{
    let mut state = RetryState::Attempting { attempt: 1 };

    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                let outcome = executor
                    .probe(descriptor, raw_proxy)
                    .await
                    .with_attempts(attempt);

                if outcome.succeeded {
                    RetryState::Succeeded(outcome)
                } else if !outcome.is_retryable() {
                    RetryState::Rejected(outcome)
                } else if attempt < policy.max_attempts() {
                    debug!(
                        proxy = raw_proxy,
                        attempt,
                        error = outcome.error_summary.as_deref().unwrap_or_default(),
                        "attempt failed, retrying"
                    );
                    RetryState::RetryScheduled { attempt }
                } else {
                    RetryState::Exhausted(outcome)
                }
            }
            RetryState::RetryScheduled { attempt } => {
                tokio::time::sleep(policy.delay).await;
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Exhausted(outcome) => {
                debug!(proxy = raw_proxy, attempts = outcome.attempts, "retries exhausted");
                return outcome;
            }
            RetryState::Succeeded(outcome) | RetryState::Rejected(outcome) => return outcome,
        };
    }
}
