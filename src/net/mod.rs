//! Connection establishment
//!
//! The worker asks a `ConnectionFactory` for a fresh `ProtocolChannel` on
//! every (re)connect attempt. `TcpConnectionFactory` is the stock factory.

mod tcp;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::{NetworkResult, ProtocolChannel};

pub use tcp::{SecureTransport, TcpConnectionFactory, Transport};

/// Opens physical connections to a journal server.
pub trait ConnectionFactory: Send + Sync {
    /// Open one channel. A failure consumes one unit of the retry budget.
    fn open(&self) -> NetworkResult<Box<dyn ProtocolChannel>>;
}

/// Journal server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = String;

    /// Parse `host:port` or `[v6-host]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", s))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in '{}'", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in '{}'", s))?;
        Ok(Self::new(host, port))
    }
}
