//! Protocol-level error types

use thiserror::Error;

/// Errors produced while framing or unframing tsserver messages.
///
/// Any of these on the inbound stream is unrecoverable for the connection:
/// the byte stream is desynchronized and the process must be torn down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed Content-Length header: {0:?}")]
    MalformedHeader(String),

    #[error("unparseable message body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("message header exceeds {limit} bytes without terminating")]
    HeaderOverrun { limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
