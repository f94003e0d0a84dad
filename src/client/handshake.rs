//! Session Handshake
//!
//! 1. `PROTOCOL_VERSION` is acknowledged with "OK".
//! 2. `HANDSHAKE_COMPLETE` is answered with "OK" (no credentials needed) or
//!    "AUTH", in which case an `AUTHORIZATION` token must be accepted with
//!    "OK".

use tracing::{debug, info};

use super::errors::{ClientError, ClientResult};
use crate::auth::CredentialProvider;
use crate::protocol::{
    ClientMessage, NetworkError, NetworkResult, ProtocolChannel, ACK_OK, AUTH_REQUIRED,
    PROTOCOL_VERSION,
};

/// Read a text response and require it to be "OK".
pub fn check_ack(channel: &mut dyn ProtocolChannel) -> NetworkResult<()> {
    let response = channel.read_text()?;
    if response == ACK_OK {
        Ok(())
    } else {
        Err(NetworkError::AckMismatch(response))
    }
}

pub fn send_protocol_version(channel: &mut dyn ProtocolChannel) -> NetworkResult<()> {
    channel.send(&ClientMessage::ProtocolVersion(PROTOCOL_VERSION))?;
    check_ack(channel)?;
    debug!(version = PROTOCOL_VERSION, "Protocol version accepted");
    Ok(())
}

/// Finish the handshake, authorizing if the server asks for it.
pub fn authenticate(
    channel: &mut dyn ProtocolChannel,
    credentials: Option<&dyn CredentialProvider>,
) -> ClientResult<()> {
    channel.send(&ClientMessage::HandshakeComplete)?;
    let response = channel.read_text()?;

    if response == ACK_OK {
        return Ok(());
    }
    if response != AUTH_REQUIRED {
        return Err(NetworkError::protocol(format!(
            "unexpected handshake response '{}'",
            response
        ))
        .into());
    }

    let provider = credentials.ok_or(ClientError::AuthenticationConfig)?;
    let token = provider
        .create_token()
        .map_err(|e| ClientError::AuthenticationProvider(e.to_string()))?;

    channel.send(&ClientMessage::Authorization(token))?;
    let verdict = channel.read_text()?;
    if verdict != ACK_OK {
        return Err(ClientError::Unauthorized(verdict));
    }
    info!(peer = channel.peer(), "Authorized");
    Ok(())
}
