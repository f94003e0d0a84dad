//! Client Configuration
//!
//! Loaded from JSON (all fields optional) or built in code:
//! - `servers`: tried in order on every connect attempt
//! - `reconnect_policy`: retry and login budgets, backoff
//! - timeouts for connect, halt and publishing to a full channel

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ClientError, ClientResult};
use crate::net::ServerAddress;

/// Bounded retry policy applied whenever the connection is down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts allowed for network failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Attempts allowed for rejected credentials
    #[serde(default = "default_login_retry_count")]
    pub login_retry_count: u32,

    /// Backoff between attempts
    #[serde(default = "default_sleep_between_retries_ms")]
    pub sleep_between_retries_ms: u64,
}

fn default_retry_count() -> u32 {
    10
}
fn default_login_retry_count() -> u32 {
    3
}
fn default_sleep_between_retries_ms() -> u64 {
    2000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            login_retry_count: default_login_retry_count(),
            sleep_between_retries_ms: default_sleep_between_retries_ms(),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(retry_count: u32, login_retry_count: u32, sleep_between_retries_ms: u64) -> Self {
        Self {
            retry_count,
            login_retry_count,
            sleep_between_retries_ms,
        }
    }

    pub fn sleep_between_retries(&self) -> Duration {
        Duration::from_millis(self.sleep_between_retries_ms)
    }
}

/// Replication client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identifies this client in server logs
    #[serde(default = "Uuid::new_v4")]
    pub client_id: Uuid,

    #[serde(default = "default_servers")]
    pub servers: Vec<ServerAddress>,

    #[serde(default)]
    pub reconnect_policy: ReconnectPolicy,

    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long `halt()` waits for teardown before force-closing
    #[serde(default = "default_timeout_ms")]
    pub halt_timeout_ms: u64,

    /// How long a publisher backs off on a full channel
    #[serde(default = "default_timeout_ms")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

fn default_servers() -> Vec<ServerAddress> {
    vec![ServerAddress::new("127.0.0.1", 7075)]
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_tcp_nodelay() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: Uuid::new_v4(),
            servers: default_servers(),
            reconnect_policy: ReconnectPolicy::default(),
            connect_timeout_ms: default_timeout_ms(),
            halt_timeout_ms: default_timeout_ms(),
            publish_timeout_ms: default_timeout_ms(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `servers`.
    pub fn with_servers(servers: Vec<ServerAddress>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_halt_timeout(mut self, timeout: Duration) -> Self {
        self.halt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn halt_timeout(&self) -> Duration {
        Duration::from_millis(self.halt_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Parse JSON and validate.
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::configuration(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file and validate.
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            ClientError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.servers.is_empty() {
            return Err(ClientError::configuration("at least one server is required"));
        }
        if let Some(server) = self.servers.iter().find(|s| s.port == 0 || s.host.is_empty()) {
            return Err(ClientError::configuration(format!(
                "invalid server address '{}'",
                server
            )));
        }
        if self.connect_timeout_ms == 0 || self.halt_timeout_ms == 0 || self.publish_timeout_ms == 0
        {
            return Err(ClientError::configuration("timeouts must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(config.servers, default_servers());
        assert_eq!(config.reconnect_policy, ReconnectPolicy::new(10, 3, 2000));
        assert_eq!(config.halt_timeout(), Duration::from_secs(5));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_partial_policy_keeps_other_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{"servers":[{"host":"db","port":9000}],"reconnect_policy":{"retry_count":2}}"#,
        )
        .unwrap();
        assert_eq!(config.servers, vec![ServerAddress::new("db", 9000)]);
        assert_eq!(config.reconnect_policy.retry_count, 2);
        assert_eq!(config.reconnect_policy.login_retry_count, 3);
    }

    #[test]
    fn test_validate_rejects_empty_servers() {
        let config = ClientConfig::with_servers(vec![]);
        assert!(matches!(config.validate(), Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_port_and_timeouts() {
        let config = ClientConfig::with_servers(vec![ServerAddress::new("db", 0)]);
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.publish_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_id_round_trips() {
        let config = ClientConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = ClientConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.client_id, config.client_id);
    }
}
