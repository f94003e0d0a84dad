//! Lifecycle Events
//!
//! The worker reports milestones and terminal causes through an
//! `EventCallback`. Every worker run emits exactly one `Running` first and
//! exactly one `Terminated` last. The terminal cause (`ClientHalt`,
//! `ServerError`, ...) is emitted just before `Terminated`.
//!
//! `HaltSignal` is the one-shot latch `halt()` waits on. The worker releases
//! it after teardown is complete.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

/// Lifecycle event with its wire-compatible bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    None,
    /// Reconnect budget exhausted
    ServerError,
    /// Worker thread started
    Running,
    /// Stopped on request
    ClientHalt,
    /// Unclassified failure
    ClientException,
    /// Local journal cannot accept remote deltas
    IncompatibleJournal,
    /// Handshake and resubscription finished
    Connected,
    /// Server wants credentials and none can be produced
    AuthConfigError,
    /// Server rejected the credentials
    AuthError,
    /// Worker thread finished
    Terminated,
}

impl ClientEvent {
    /// Bit value of the event.
    pub fn bits(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::ServerError => 1,
            Self::Running => 2,
            Self::ClientHalt => 4,
            Self::ClientException => 8,
            Self::IncompatibleJournal => 16,
            Self::Connected => 32,
            Self::AuthConfigError => 64,
            Self::AuthError => 128,
            Self::Terminated => 256,
        }
    }

    /// Event for an exact bit value.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let event = match bits {
            0 => Self::None,
            1 => Self::ServerError,
            2 => Self::Running,
            4 => Self::ClientHalt,
            8 => Self::ClientException,
            16 => Self::IncompatibleJournal,
            32 => Self::Connected,
            64 => Self::AuthConfigError,
            128 => Self::AuthError,
            256 => Self::Terminated,
            _ => return None,
        };
        Some(event)
    }

    /// Check if the event is a terminal cause.
    pub fn is_terminal_cause(&self) -> bool {
        matches!(
            self,
            Self::ServerError
                | Self::ClientHalt
                | Self::ClientException
                | Self::IncompatibleJournal
                | Self::AuthConfigError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::ServerError => "SERVER_ERROR",
            Self::Running => "RUNNING",
            Self::ClientHalt => "CLIENT_HALT",
            Self::ClientException => "CLIENT_EXCEPTION",
            Self::IncompatibleJournal => "INCOMPATIBLE_JOURNAL",
            Self::Connected => "CONNECTED",
            Self::AuthConfigError => "AUTH_CONFIG_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives lifecycle events on the worker thread.
pub trait EventCallback: Send + Sync {
    fn on_event(&self, event: ClientEvent);
}

impl<F> EventCallback for F
where
    F: Fn(ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: ClientEvent) {
        self(event)
    }
}

/// Logs every event and forwards it to the optional callback.
#[derive(Clone, Default)]
pub struct EventNotifier {
    callback: Option<Arc<dyn EventCallback>>,
}

impl EventNotifier {
    pub fn new(callback: Option<Arc<dyn EventCallback>>) -> Self {
        Self { callback }
    }

    pub fn notify(&self, event: ClientEvent) {
        match event {
            ClientEvent::ServerError
            | ClientEvent::ClientException
            | ClientEvent::AuthConfigError => error!(event = %event, "Client event"),
            ClientEvent::IncompatibleJournal | ClientEvent::AuthError => {
                warn!(event = %event, "Client event")
            }
            _ => info!(event = %event, "Client event"),
        }
        if let Some(callback) = &self.callback {
            callback.on_event(event);
        }
    }
}

/// One-shot completion latch
#[derive(Debug, Default)]
pub struct HaltSignal {
    released: Mutex<bool>,
    cond: Condvar,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all current and future waiters. Returns false if it was
    /// already released.
    pub fn release(&self) -> bool {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        if *released {
            return false;
        }
        *released = true;
        self.cond.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout`. Returns true if the latch was released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        while !*released {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(released, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            released = guard;
        }
        true
    }
}
