//! Client Error Types
//!
//! Failures surfaced by the public client API and classified by the worker.
//! Only API calls return these to callers; inside the worker every error
//! ends up as a lifecycle event.

use thiserror::Error;

use crate::journal::JournalError;
use crate::protocol::NetworkError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Replication client errors
#[derive(Debug, Error)]
pub enum ClientError {
    // ==================
    // Control channel
    // ==================
    /// Channel is full and the worker was never started
    #[error("Client is not started")]
    NotStarted,

    /// Worker has terminated and the channel is closed
    #[error("Client is not running")]
    NotRunning,

    #[error("Client is already started")]
    AlreadyStarted,

    /// Worker did not free a slot within the publish timeout
    #[error("Subscription channel full ({0} slots)")]
    ChannelFull(usize),

    // ==================
    // Session
    // ==================
    /// Transient wire failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Server rejected the credentials
    #[error("Authorization rejected: {0}")]
    Unauthorized(String),

    /// Server requires credentials but none are configured
    #[error("Server requires authentication but no credential provider is configured")]
    AuthenticationConfig,

    /// Credential provider could not produce a token
    #[error("Credential provider failed: {0}")]
    AuthenticationProvider(String),

    // ==================
    // Journals
    // ==================
    #[error("Journal {local} is incompatible with remote {remote}")]
    IncompatibleJournal { local: String, remote: String },

    #[error("Already subscribed to journal at {0}")]
    DuplicateSubscription(String),

    #[error("Server referenced unknown journal index {0}")]
    UnknownJournalIndex(usize),

    #[error("Journal error: {0}")]
    Journal(JournalError),

    // ==================
    // Setup
    // ==================
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Worker thread could not be spawned or panicked
    #[error("Worker failure: {0}")]
    Worker(String),
}

impl ClientError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if the failure is a transient network failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<JournalError> for ClientError {
    fn from(err: JournalError) -> Self {
        match err {
            JournalError::Incompatible { local, remote } => {
                Self::IncompatibleJournal { local, remote }
            }
            other => Self::Journal(other),
        }
    }
}
