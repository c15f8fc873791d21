//! Per-endpoint-class circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive endpoint failures;
//! Open → HalfOpen once `reset_timeout` elapses; the single HalfOpen probe
//! closes the circuit on success and reopens it on failure. While Open,
//! calls fail fast without invoking the wrapped operation.
//!
//! Only calls that actually execute count toward the tally, and the lock is
//! never held across I/O.

use std::future::Future;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for one remote endpoint class. Safe under concurrent
/// invocation; the orchestrator shares one instance per class across
/// parallel subtrees.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(endpoint: &'static str, config: BreakerConfig) -> Self {
        Self {
            endpoint,
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Run `op` under the breaker. Cancellation is neutral: it neither
    /// counts as a failure nor closes the circuit.
    pub async fn call<T, F, Fut>(&self, op: F) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let is_probe = self.try_acquire()?;
        let result = op().await;
        self.record(is_probe, &result);
        result
    }

    /// Admission check. Returns whether this call is the HalfOpen probe.
    fn try_acquire(&self) -> ClientResult<bool> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(false),
            BreakerState::HalfOpen => {
                // A probe is already in flight.
                Err(ClientError::CircuitOpen {
                    endpoint: self.endpoint,
                })
            }
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed().as_millis() as u64)
                    .unwrap_or(u64::MAX);
                if elapsed >= self.config.reset_timeout_ms {
                    tracing::debug!(endpoint = self.endpoint, "circuit half-open, admitting probe");
                    inner.state = BreakerState::HalfOpen;
                    Ok(true)
                } else {
                    Err(ClientError::CircuitOpen {
                        endpoint: self.endpoint,
                    })
                }
            }
        }
    }

    fn record<T>(&self, is_probe: bool, result: &ClientResult<T>) {
        let mut inner = self.inner.lock();
        match result {
            // Cancellation says nothing about endpoint health. A canceled
            // probe re-arms the Open state so the next caller may probe.
            Err(ClientError::Canceled) => {
                if is_probe {
                    inner.state = BreakerState::Open;
                }
            }
            Err(e) if e.is_endpoint_failure() => {
                if is_probe {
                    tracing::debug!(endpoint = self.endpoint, "probe failed, reopening circuit");
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        tracing::debug!(
                            endpoint = self.endpoint,
                            failures = inner.consecutive_failures,
                            "failure threshold reached, opening circuit"
                        );
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
            // Success, or a business error: the endpoint answered.
            _ => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
        }
    }
}
