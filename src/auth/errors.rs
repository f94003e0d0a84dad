//! # Credential Errors
//!
//! Error types for credential providers.

use thiserror::Error;

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Credential provider failures
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The provider has nothing to offer (empty or missing secret)
    #[error("No credentials configured")]
    Missing,

    /// Encoded credential could not be decoded
    #[error("Malformed credential: {0}")]
    Malformed(String),

    /// Provider-specific failure while producing a token
    #[error("Credential provider failed: {0}")]
    Provider(String),
}
