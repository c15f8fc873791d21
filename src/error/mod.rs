//! Error types for the orchestration engine.
//!
//! - [`ClientError`] — Errors raised by remote calls and workflows.
//! - [`ErrorContext`] — Structured error metadata (kind, retryability, status).

pub mod client_error;
pub mod error_context;

pub use client_error::ClientError;
pub use error_context::{ErrorContext, ErrorKind, Retryability};

/// Convenience alias for client-level results.
pub type ClientResult<T> = Result<T, ClientError>;
