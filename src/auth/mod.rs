//! # Credentials
//!
//! Token generation for the `AUTHORIZATION` step of the handshake. The token
//! format is opaque to the client; it only forwards the bytes.

pub mod errors;

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub use errors::{CredentialError, CredentialResult};

/// Produces the authorization token sent when a server asks for credentials.
pub trait CredentialProvider: Send + Sync {
    fn create_token(&self) -> CredentialResult<Vec<u8>>;
}

/// Provider that always answers with the same token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Vec<u8>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Decode a standard base64 token.
    pub fn from_base64(encoded: &str) -> CredentialResult<Self> {
        let token = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        Ok(Self::new(token))
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .finish()
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn create_token(&self) -> CredentialResult<Vec<u8>> {
        if self.token.is_empty() {
            return Err(CredentialError::Missing);
        }
        Ok(self.token.clone())
    }
}
