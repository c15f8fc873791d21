//! Failure-handling building blocks: retry with backoff, and per-endpoint
//! circuit breaking. Both compose over explicit cancellable operations
//! rather than captured ambient state.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use retry::{run_with_retry, Idempotency, RetryPolicy};
