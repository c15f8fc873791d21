//! Client configuration.
//!
//! Plain data; file and environment loading live with the caller. All knobs
//! have serde defaults so partial configs deserialize cleanly.

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerConfig, RetryPolicy};

/// Hosted API endpoint used when the caller does not override `base_url`.
pub const DEFAULT_BASE_URL: &str = "https://api.journeylab.example/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_token: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Delay between execution status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overall deadline for waiting on one execution.
    #[serde(default = "default_execution_deadline_ms")]
    pub execution_deadline_ms: u64,
    /// Concurrent goal subtrees during batch creation. 1 = sequential.
    #[serde(default = "default_max_goal_parallelism")]
    pub max_goal_parallelism: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_execution_deadline_ms() -> u64 {
    600_000
}
fn default_max_goal_parallelism() -> usize {
    1
}

impl ClientConfig {
    /// Config with defaults everywhere but the token.
    pub fn for_token(api_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_token: api_token.into(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            execution_deadline_ms: default_execution_deadline_ms(),
            max_goal_parallelism: default_max_goal_parallelism(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_token_defaults() {
        let config = ClientConfig::for_token("tok_abc");
        assert_eq!(config.api_token, "tok_abc");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.max_goal_parallelism, 1);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_token": "tok_xyz", "request_timeout_ms": 5000}"#,
        )
        .unwrap();
        assert_eq!(config.api_token, "tok_xyz");
        assert_eq!(config.request_timeout_ms, 5_000);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval_ms, 2_000);
        assert!(config.retry.jitter);
    }
}
