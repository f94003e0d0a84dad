//! Reconnect Policy Executor
//!
//! Runs connect attempts until one succeeds or a budget runs out:
//! - network failures consume `retry_count`
//! - rejected credentials emit `AuthError` and consume `login_retry_count`
//! - credential configuration failures end the loop immediately
//! - a pending halt ends the loop before the next attempt
//!
//! A budget of zero is treated as one attempt.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::config::ReconnectPolicy;
use super::errors::{ClientError, ClientResult};
use super::events::ClientEvent;

/// Session the executor drives
pub trait ConnectTarget {
    /// One full attempt: open, handshake, resubscribe, ready.
    fn attempt(&mut self) -> ClientResult<()>;

    /// Check for a halt request without consuming it.
    fn halt_requested(&mut self) -> bool;

    fn notify(&self, event: ClientEvent);

    fn backoff(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// How the reconnect loop ended
#[derive(Debug)]
pub enum ReconnectOutcome {
    Connected,
    /// Retry or login budget used up
    Exhausted,
    /// Credentials cannot be produced; retrying will not help
    AuthConfigFailed(ClientError),
    Halted,
    /// Unclassified failure
    Failed(ClientError),
}

pub struct ReconnectExecutor {
    policy: ReconnectPolicy,
}

impl ReconnectExecutor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn run<T: ConnectTarget + ?Sized>(&self, target: &mut T) -> ReconnectOutcome {
        let mut retries = self.policy.retry_count.max(1);
        let mut logins = self.policy.login_retry_count.max(1);

        loop {
            if target.halt_requested() {
                return ReconnectOutcome::Halted;
            }

            match target.attempt() {
                Ok(()) => {
                    target.notify(ClientEvent::Connected);
                    return ReconnectOutcome::Connected;
                }
                Err(ClientError::Unauthorized(reason)) => {
                    warn!(reason = %reason, logins_left = logins - 1, "Server rejected credentials");
                    target.notify(ClientEvent::AuthError);
                    logins -= 1;
                }
                Err(
                    err @ (ClientError::AuthenticationConfig
                    | ClientError::AuthenticationProvider(_)),
                ) => return ReconnectOutcome::AuthConfigFailed(err),
                Err(err) if err.is_network() => {
                    warn!(error = %err, retries_left = retries - 1, "Connect attempt failed");
                    retries -= 1;
                }
                Err(err) => return ReconnectOutcome::Failed(err),
            }

            if retries == 0 || logins == 0 {
                info!("Reconnect budget exhausted");
                return ReconnectOutcome::Exhausted;
            }
            target.backoff(self.policy.sleep_between_retries());
        }
    }
}
