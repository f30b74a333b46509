//! Common error types for Parley.

use thiserror::Error;

/// Result type alias using Parley's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Parley operations.
///
/// `Capability`, `Transport` and `Protocol` are the three terminal failure
/// kinds of a negotiation; the rest cover the surrounding plumbing.
#[derive(Debug, Error)]
pub enum Error {
    /// Peer-connection creation or description handling failed
    #[error("capability error: {0}")]
    Capability(String),

    /// Exchange endpoint unreachable, closed, or answered with a non-2xx status
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected session description
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Negotiation was cancelled by `stop()`
    #[error("negotiation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a capability error from any displayable type.
    pub fn capability(msg: impl std::fmt::Display) -> Self {
        Self::Capability(msg.to_string())
    }

    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a protocol error from any displayable type.
    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create a timeout error from any displayable type.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
