//! Protocol Commands
//!
//! Client and server exchange single-byte commands, each optionally followed
//! by a typed payload. Client-side commands are modelled as `ClientMessage`
//! variants carrying their payload; server-side commands are read as a bare
//! `ServerCommand` and the session reads the payload that follows.

use std::fmt;

use crate::journal::{JournalKey, JournalState};

/// Version sent during the handshake.
pub const PROTOCOL_VERSION: i32 = 1;

/// Literal acknowledgement text.
pub const ACK_OK: &str = "OK";

/// Handshake response asking the client for credentials.
pub const AUTH_REQUIRED: &str = "AUTH";

/// Command bytes on the wire.
pub mod codes {
    pub const PROTOCOL_VERSION: u8 = 0x01;
    pub const HANDSHAKE_COMPLETE: u8 = 0x02;
    pub const AUTHORIZATION: u8 = 0x03;
    pub const CLIENT_READY: u8 = 0x04;
    pub const CLIENT_DISCONNECT: u8 = 0x05;
    pub const SET_KEY: u8 = 0x06;
    pub const DELTA_REQUEST: u8 = 0x07;

    pub const JOURNAL_DELTA: u8 = 0x10;
    pub const SERVER_READY: u8 = 0x11;
    pub const SERVER_HEARTBEAT: u8 = 0x12;
    pub const SERVER_SHUTDOWN: u8 = 0x13;
}

/// Remote journal key bound to a subscription index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedJournalKey {
    pub index: usize,
    pub key: JournalKey,
}

impl IndexedJournalKey {
    pub fn new(index: usize, key: JournalKey) -> Self {
        Self { index, key }
    }
}

/// Local journal state reported for a subscription index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedJournalState {
    pub index: usize,
    pub state: JournalState,
}

impl IndexedJournalState {
    pub fn new(index: usize, state: JournalState) -> Self {
        Self { index, state }
    }
}

/// Messages the client sends, one variant per command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Protocol version; server acknowledges with "OK"
    ProtocolVersion(i32),
    /// End of version negotiation; server answers "OK" or "AUTH"
    HandshakeComplete,
    /// Credential token; server answers "OK" when accepted
    Authorization(Vec<u8>),
    /// Client is ready for the next server command
    ClientReady,
    /// Client is going away
    ClientDisconnect,
    /// Bind a remote journal to an index; server acknowledges, then sends metadata
    SetKey(IndexedJournalKey),
    /// Ask for deltas past the given state; server acknowledges
    DeltaRequest(IndexedJournalState),
}

impl ClientMessage {
    /// Command byte for this message.
    pub fn code(&self) -> u8 {
        match self {
            Self::ProtocolVersion(_) => codes::PROTOCOL_VERSION,
            Self::HandshakeComplete => codes::HANDSHAKE_COMPLETE,
            Self::Authorization(_) => codes::AUTHORIZATION,
            Self::ClientReady => codes::CLIENT_READY,
            Self::ClientDisconnect => codes::CLIENT_DISCONNECT,
            Self::SetKey(_) => codes::SET_KEY,
            Self::DeltaRequest(_) => codes::DELTA_REQUEST,
        }
    }

    /// Command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProtocolVersion(_) => "PROTOCOL_VERSION",
            Self::HandshakeComplete => "HANDSHAKE_COMPLETE",
            Self::Authorization(_) => "AUTHORIZATION",
            Self::ClientReady => "CLIENT_READY",
            Self::ClientDisconnect => "CLIENT_DISCONNECT",
            Self::SetKey(_) => "SET_KEY",
            Self::DeltaRequest(_) => "DELTA_REQUEST",
        }
    }
}

/// Commands the server sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    /// Followed by a journal index and the delta payload
    JournalDelta,
    /// Server finished a round; client reports stale states
    ServerReady,
    /// Periodic liveness probe; client drains its subscription queue
    ServerHeartbeat,
    /// Server is going away; client should reconnect
    ServerShutdown,
    /// Anything else, logged and ignored
    Unknown(u8),
}

impl ServerCommand {
    /// Decode a command byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            codes::JOURNAL_DELTA => Self::JournalDelta,
            codes::SERVER_READY => Self::ServerReady,
            codes::SERVER_HEARTBEAT => Self::ServerHeartbeat,
            codes::SERVER_SHUTDOWN => Self::ServerShutdown,
            other => Self::Unknown(other),
        }
    }

    /// Command byte on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::JournalDelta => codes::JOURNAL_DELTA,
            Self::ServerReady => codes::SERVER_READY,
            Self::ServerHeartbeat => codes::SERVER_HEARTBEAT,
            Self::ServerShutdown => codes::SERVER_SHUTDOWN,
            Self::Unknown(byte) => *byte,
        }
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JournalDelta => write!(f, "JOURNAL_DELTA"),
            Self::ServerReady => write!(f, "SERVER_READY"),
            Self::ServerHeartbeat => write!(f, "SERVER_HEARTBEAT"),
            Self::ServerShutdown => write!(f, "SERVER_SHUTDOWN"),
            Self::Unknown(byte) => write!(f, "UNKNOWN(0x{:02x})", byte),
        }
    }
}
