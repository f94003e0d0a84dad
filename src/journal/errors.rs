//! Journal Error Types

use std::io;

use thiserror::Error;

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

/// Local journal failures
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Local and remote structure disagree
    #[error("Journal {local} is incompatible with remote {remote}")]
    Incompatible { local: String, remote: String },

    #[error("Invalid journal metadata: {0}")]
    InvalidMetadata(String),

    #[error("Journal writer is closed")]
    Closed,

    #[error("Journal writer failed: {0}")]
    Writer(String),
}

impl JournalError {
    /// Create an incompatibility error.
    pub fn incompatible(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::Incompatible {
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// Create a generic writer error.
    pub fn writer(message: impl Into<String>) -> Self {
        Self::Writer(message.into())
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}
