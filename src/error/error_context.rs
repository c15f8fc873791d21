use serde::{Deserialize, Serialize};

/// Error retryability marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retryability {
    Retryable,
    NonRetryable,
    Unknown,
}

/// Error classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Validation,
    Conflict,
    RateLimited,
    Timeout,
    InternalTransient,
    InternalPermanent,
    ContextCanceled,
    Serialization,
}

/// Structured error metadata attached to transport and API failures.
///
/// The retry executor consults [`Retryability`] through
/// [`ClientError::is_retryable`](crate::error::ClientError::is_retryable);
/// everything else is diagnostic payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub kind: ErrorKind,
    pub retryability: Retryability,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ErrorContext {
    pub fn non_retryable(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryability: Retryability::NonRetryable,
            message: message.into(),
            retry_after_secs: None,
            http_status: None,
        }
    }

    pub fn retryable(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryability: Retryability::Retryable,
            message: message.into(),
            retry_after_secs: None,
            http_status: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryability == Retryability::Retryable
    }

    /// Classify an HTTP status into the fixed taxonomy.
    ///
    /// 5xx responses are transient unless the remote explicitly signals a
    /// permanent failure (501/505). ContextCanceled never originates here;
    /// cancellation is observed client-side.
    pub fn classify_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let ctx = match status {
            404 | 410 => Self::non_retryable(ErrorKind::NotFound, message),
            401 => Self::non_retryable(ErrorKind::Unauthorized, message),
            403 => Self::non_retryable(ErrorKind::Forbidden, message),
            400 | 422 => Self::non_retryable(ErrorKind::Validation, message),
            409 => Self::non_retryable(ErrorKind::Conflict, message),
            429 => Self::retryable(ErrorKind::RateLimited, message),
            408 | 504 => Self::retryable(ErrorKind::Timeout, message),
            501 | 505 => Self::non_retryable(ErrorKind::InternalPermanent, message),
            500..=599 => Self::retryable(ErrorKind::InternalTransient, message),
            _ => Self::non_retryable(ErrorKind::Validation, message),
        };
        ctx.with_http_status(status)
    }
}
