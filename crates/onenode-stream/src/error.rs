//! Error types for the streaming client.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Result type alias for client operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by requests and body reads.
///
/// A 205 response is not an error; it is reported as
/// [`ResponseOutcome::Signal`](crate::ResponseOutcome::Signal). Malformed
/// UTF-8 in a body is not an error either; the decoder substitutes U+FFFD.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {}: {}", .status.as_u16(), .detail)]
    Http { status: StatusCode, detail: String },

    #[error("body read error: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),
}

impl StreamError {
    /// HTTP status of a rejected request, if that is what this is.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            StreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
