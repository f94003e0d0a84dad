//! Network Error Types
//!
//! Every failure that happens on the wire is a `NetworkError`, as is a local
//! journal that cannot be opened while subscribing. The session layer treats
//! all of them as transient: the connection is dropped and the reconnect
//! policy decides whether to try again.

use std::io;

use thiserror::Error;

use crate::journal::JournalError;

/// Result type for channel operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Wire-level failures
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Peer hung up, or the channel was closed locally
    #[error("Connection closed")]
    Closed,

    /// No configured server accepted the connection
    #[error("Could not connect: {0}")]
    ConnectFailed(String),

    /// Server answered with something other than "OK"
    #[error("Unexpected acknowledgement: {0}")]
    AckMismatch(String),

    /// Malformed frame or out-of-sequence response
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Local journal failed while binding a subscription
    #[error("Journal unavailable: {0}")]
    Journal(#[source] JournalError),
}

impl NetworkError {
    /// Create a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if the peer (or a local force-close) ended the conversation.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => Self::Closed,
            _ => Self::Io(err),
        }
    }
}
