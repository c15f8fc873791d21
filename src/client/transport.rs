//! Transport seam: the one place that touches the network.
//!
//! Everything above this trait sees raw bytes plus a status code; everything
//! below it is `reqwest`. Tests substitute a scripted implementation.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorContext, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One remote request: method, path relative to the base URL, and an
/// optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw transport outcome: status code and body bytes, plus the parsed
/// `Retry-After` header when the remote supplied one.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub retry_after_secs: Option<u64>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network black box. Implementations must honor `cancel` by aborting the
/// in-flight call and surfacing [`ClientError::Canceled`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &ApiRequest, cancel: &CancellationToken) -> ClientResult<RawResponse>;
}

/// `reqwest`-backed transport carrying bearer auth and per-request
/// correlation ids.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(Some(std::time::Duration::from_secs(60)))
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| {
                ClientError::transport(
                    false,
                    ErrorContext::non_retryable(ErrorKind::Validation, e.to_string()),
                )
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: &ApiRequest, cancel: &CancellationToken) -> ClientResult<RawResponse> {
        let url = self.url_for(&req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder
            .bearer_auth(&self.token)
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string());
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            result = builder.send() => result.map_err(classify_reqwest_error)?,
        };

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            result = response.bytes() => result.map_err(classify_reqwest_error)?,
        };

        Ok(RawResponse {
            status,
            body: body.to_vec(),
            retry_after_secs,
        })
    }
}

/// Map a `reqwest` failure into the taxonomy, recording whether the request
/// had left the client.
fn classify_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_connect() {
        // Nothing reached the remote; safe to retry even for writes.
        return ClientError::transport(
            false,
            ErrorContext::retryable(ErrorKind::InternalTransient, format!("connection failure: {}", e)),
        );
    }
    if e.is_timeout() {
        return ClientError::transport(
            true,
            ErrorContext::retryable(ErrorKind::Timeout, format!("request timed out: {}", e)),
        );
    }
    if e.is_builder() || e.is_request() {
        return ClientError::transport(
            false,
            ErrorContext::non_retryable(ErrorKind::Validation, e.to_string()),
        );
    }
    ClientError::transport(
        true,
        ErrorContext::retryable(ErrorKind::InternalTransient, e.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_strips_slashes() {
        let config = ClientConfig {
            base_url: "https://api.example.com/v2/".into(),
            ..ClientConfig::for_token("t")
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.url_for("/projects/1/goals"),
            "https://api.example.com/v2/projects/1/goals"
        );
        assert_eq!(
            transport.url_for("projects"),
            "https://api.example.com/v2/projects"
        );
    }

    #[test]
    fn test_request_builders() {
        let get = ApiRequest::get("goals/1");
        assert_eq!(get.method, Method::Get);
        assert!(get.body.is_none());

        let post = ApiRequest::post("goals", serde_json::json!({"name": "g"}));
        assert_eq!(post.method, Method::Post);
        assert!(post.body.is_some());
    }

    #[test]
    fn test_raw_response_success_range() {
        let ok = RawResponse { status: 201, body: vec![], retry_after_secs: None };
        assert!(ok.is_success());
        let nope = RawResponse { status: 404, body: vec![], retry_after_secs: None };
        assert!(!nope.is_success());
    }
}
