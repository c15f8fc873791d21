//! Bounded exponential backoff with jitter around cancellable operations.
//!
//! The remote accepts no client-supplied idempotency keys, so creation calls
//! are only re-run when the failure provably occurred before the request
//! left the transport. Reads and polls retry freely.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};

/// Retry policy: attempt bound and backoff curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    250
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt following `attempt` (1-based):
    /// min(initial × multiplier^(attempt−1), max), plus up to 30% uniform
    /// jitter when enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exp as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        let with_jitter = if self.jitter {
            capped + rand::random::<f64>() * capped * 0.3
        } else {
            capped
        };
        Duration::from_millis(with_jitter as u64)
    }
}

/// Whether an operation may be re-sent after an ambiguous failure.
///
/// `Unsafe` marks writes: they retry only on failures that occurred
/// strictly before the request left the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Safe,
    Unsafe,
}

/// Run `op` under the retry policy, observing cancellation both before and
/// during each backoff sleep.
///
/// Terminal failures return immediately without consuming further attempts;
/// exhausting the attempt bound wraps the last error with the attempt count.
pub async fn run_with_retry<T, F, Fut>(
    op_name: &str,
    policy: &RetryPolicy,
    idempotency: Idempotency,
    cancel: &CancellationToken,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(ClientError::Canceled) => return Err(ClientError::Canceled),
            Err(e) => e,
        };

        let mut allowed = err.is_retryable();
        if allowed && idempotency == Idempotency::Unsafe && err.was_sent() {
            // Outcome ambiguous after the request went out; re-sending
            // could silently duplicate the remote resource.
            allowed = false;
        }
        if !allowed {
            return Err(err);
        }
        if attempt == max_attempts {
            return Err(ClientError::RetriesExhausted {
                attempts: max_attempts,
                source: Box::new(err),
            });
        }

        // A remote-provided retry-after hint overrides the backoff curve.
        let delay = err
            .context()
            .and_then(|ctx| ctx.retry_after_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| policy.delay_for(attempt));

        tracing::debug!(
            op = op_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after backoff"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    unreachable!("retry loop returns on success, terminal error, or exhaustion")
}
