//! Shared fixtures for the client integration tests
//!
//! - `server`: scripted in-process server behind a `ConnectionFactory`
//! - `journal`: recording writers, factory and listener
//! - `events`: lifecycle event capture

#![allow(dead_code)]

pub mod events;
pub mod journal;
pub mod server;

pub use events::*;
pub use journal::*;
pub use server::*;

use std::time::Duration;

use aerodb_journal_client::client::{ClientConfig, ReconnectPolicy};

/// Config with fast retries and short timeouts.
pub fn fast_config(retry_count: u32, login_retry_count: u32) -> ClientConfig {
    let mut config = ClientConfig::default()
        .with_reconnect_policy(ReconnectPolicy::new(retry_count, login_retry_count, 10))
        .with_halt_timeout(Duration::from_secs(5));
    config.publish_timeout_ms = 500;
    config
}
