//! Error types for response dispatch.
//!
//! Every failure a dispatch can end in is one variant of [`DispatchError`]. The
//! variants are mutually exclusive: exactly one is produced per failed run.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::transport::{HttpRequest, HttpResponse};
use crate::validator::Diagnostic;

/// Identifies which handler was running when a handler failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerId {
    /// Handler registered for a specific status code.
    Status(u16),
    /// The value-producing fallback.
    Fallback,
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerId::Status(code) => write!(f, "handler[{code}]"),
            HandlerId::Fallback => f.write_str("fallback"),
        }
    }
}

/// Flat discriminant of [`DispatchError`], handy for matching in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    BodyDecode,
    Validation,
    HandlerExecution,
    UnhandledStatus,
    Unmatched,
}

/// Main error type for dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport failed before a response was produced.
    #[error("network failure for {} {}: {source}", .request.method, .request.url)]
    Network {
        /// The request descriptor that was being sent.
        request: Box<HttpRequest>,
        #[source]
        source: anyhow::Error,
    },

    /// The extractor could not turn the response into a body value.
    #[error("failed to decode body of {} response: {source}", .response.status)]
    BodyDecode {
        /// The response whose body could not be decoded.
        response: Box<HttpResponse>,
        /// Raw body text, when it could be captured.
        raw_text: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    /// The body did not satisfy its schema.
    #[error("response validation failed: {0}")]
    Validation(Diagnostic),

    /// A registered handler returned an error or panicked.
    #[error("{handler} failed: {source}")]
    HandlerExecution {
        /// The value the handler was invoked with.
        input: Value,
        handler: HandlerId,
        #[source]
        source: anyhow::Error,
    },

    /// No handler and no fallback matched the response status.
    #[error("unhandled response status {status}")]
    UnhandledStatus { status: u16 },

    /// The error produced by an error fallback for an unmatched status.
    #[error("unmatched response status {status}: {source}")]
    Unmatched {
        status: u16,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Network { .. } => ErrorKind::Network,
            DispatchError::BodyDecode { .. } => ErrorKind::BodyDecode,
            DispatchError::Validation(_) => ErrorKind::Validation,
            DispatchError::HandlerExecution { .. } => ErrorKind::HandlerExecution,
            DispatchError::UnhandledStatus { .. } => ErrorKind::UnhandledStatus,
            DispatchError::Unmatched { .. } => ErrorKind::Unmatched,
        }
    }

    /// HTTP status of the response involved, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::BodyDecode { response, .. } => Some(response.status),
            DispatchError::UnhandledStatus { status } | DispatchError::Unmatched { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Diagnostic attached to a validation failure.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            DispatchError::Validation(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

/// Result type alias using DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;
