use std::time::Duration;
use thiserror::Error;

/// Custom error types for VaultFS operations
#[derive(Debug, Error)]
pub enum VaultFsError {
    /// Configuration errors (missing or malformed key/IV, bad paths).
    /// Fatal at startup: the process must not serve traffic with these.
    #[error("Config error: {0}")]
    Config(String),

    /// Cipher failures (malformed ciphertext, block alignment, padding)
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Source file exceeds the configured retrieval ceiling.
    /// Raised before any read handle is opened.
    #[error("source is {actual} bytes, exceeding the {limit}-byte limit")]
    LimitExceeded { actual: u64, limit: u64 },

    /// The operation did not complete within its wall-clock budget
    #[error("stream timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The sink was closed or cancelled before the stream completed
    #[error("sink closed before the stream completed")]
    SinkClosed,

    /// Underlying filesystem failure on open/read/write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata sidecar encode/decode errors
    #[error("Metadata error: {0}")]
    Metadata(String),
}

impl VaultFsError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn cipher(msg: impl Into<String>) -> Self {
        Self::Cipher(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Whether this error is terminal configuration (refuse to start)
    /// as opposed to a per-operation failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
