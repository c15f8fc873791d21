//! Client-level error types.

use thiserror::Error;

use super::{ErrorContext, ErrorKind};
use crate::model::ResourceId;

/// Errors surfaced by the client and the workflow engine.
///
/// Placeholder and no-id outcomes are deliberately NOT here — they are
/// distinguishable success variants of
/// [`Extraction`](crate::normalize::Extraction).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or connection failure. `sent` records whether the request
    /// left the client before the failure; the retry executor refuses to
    /// re-run a non-idempotent write once `sent` is true.
    #[error("transport error: {}", context.message)]
    Transport { sent: bool, context: ErrorContext },

    /// Response bytes match no known shape and carry no error indicator.
    #[error("protocol error: {detail}")]
    Protocol { detail: String, raw: String },

    /// Remote-reported business failure.
    #[error("API error ({status}): {message}")]
    Api {
        code: Option<String>,
        status: u16,
        message: String,
        context: ErrorContext,
    },

    /// A resource was created but a mandatory follow-up step failed.
    /// Carries the orphan's identifier so the caller can retry the
    /// follow-up or discard the orphan.
    #[error("orphaned resource {id}: {action} failed: {source}")]
    Orphaned {
        id: ResourceId,
        action: String,
        #[source]
        source: Box<ClientError>,
    },

    /// Caller-supplied input violates a precondition.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("operation canceled")]
    Canceled,

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Fail-fast outcome while a circuit is open; terminal for the retry
    /// executor.
    #[error("circuit open for {endpoint}")]
    CircuitOpen { endpoint: &'static str },

    /// An overall wait bound elapsed (execution polling). Distinct from a
    /// per-request timeout, which classifies as a transport failure.
    #[error("deadline exceeded after {waited_ms}ms")]
    DeadlineExceeded { waited_ms: u64 },

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    /// Operation-name context attached on the way out to the caller.
    #[error("{op}: {source}")]
    Op {
        op: String,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    pub fn transport(sent: bool, context: ErrorContext) -> Self {
        ClientError::Transport { sent, context }
    }

    pub fn protocol(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        ClientError::Protocol {
            detail: detail.into(),
            raw: raw.into(),
        }
    }

    /// Attach the name of the failing operation.
    pub fn with_op(self, op: impl Into<String>) -> Self {
        ClientError::Op {
            op: op.into(),
            source: Box::new(self),
        }
    }

    /// Structured context, if this error carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ClientError::Transport { context, .. } | ClientError::Api { context, .. } => {
                Some(context)
            }
            ClientError::Orphaned { source, .. }
            | ClientError::RetriesExhausted { source, .. }
            | ClientError::Op { source, .. } => source.context(),
            _ => None,
        }
    }

    /// Whether the request left the client before this error occurred.
    /// Errors with no transport component are treated as pre-send.
    pub fn was_sent(&self) -> bool {
        match self {
            ClientError::Transport { sent, .. } => *sent,
            ClientError::Api { .. } => true,
            ClientError::Op { source, .. } | ClientError::RetriesExhausted { source, .. } => {
                source.was_sent()
            }
            _ => false,
        }
    }

    /// Retryability predicate for the retry executor.
    ///
    /// RateLimited, Timeout, InternalTransient and pre-send connection
    /// failures retry; everything else is terminal. Canceled is always
    /// terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { context, .. } | ClientError::Api { context, .. } => {
                context.is_retryable()
            }
            ClientError::Op { source, .. } => source.is_retryable(),
            ClientError::Canceled
            | ClientError::CircuitOpen { .. }
            | ClientError::DeadlineExceeded { .. }
            | ClientError::RetriesExhausted { .. }
            | ClientError::Protocol { .. }
            | ClientError::Orphaned { .. }
            | ClientError::Validation(_)
            | ClientError::Serialization(_) => false,
        }
    }

    /// Failures that count toward a circuit breaker's consecutive-failure
    /// tally: the endpoint itself is unhealthy (network, timeout, 5xx), not
    /// the request (4xx business errors respond fine).
    pub fn is_endpoint_failure(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::Api { context, .. } => {
                matches!(
                    context.kind,
                    ErrorKind::Timeout | ErrorKind::InternalTransient | ErrorKind::InternalPermanent
                )
            }
            ClientError::Op { source, .. } => source.is_endpoint_failure(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}
