//! Error types for tsserver lifecycle management

use thiserror::Error;
use tsbridge_protocol::ProtocolError;

/// Errors that can occur while discovering, spawning or driving tsserver.
#[derive(Debug, Error)]
pub enum TsServerError {
    #[error("no usable tsserver found (looked at user setting, workspace, bundled fallback)")]
    NotFound,

    #[error("failed to spawn tsserver: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("tsserver exited: {reason}")]
    ProcessExited { reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("tsserver crashed {count} times in {window_secs}s, giving up")]
    CrashLoop { count: usize, window_secs: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TsServerError>;
