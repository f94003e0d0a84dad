//! Metrics registry for the replication client
//!
//! - Counters only, monotonic
//! - Reset only when the client is created
//! - Thread-safe and lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one client
///
/// # Thread Safety
///
/// The worker increments, callers read. Relaxed ordering is enough since
/// no counter guards other memory.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    /// Successful connect + handshake + resubscribe rounds
    connections_opened: AtomicU64,
    /// Credentials rejected by the server
    auth_failures: AtomicU64,
    /// Deltas committed to local journals
    deltas_applied: AtomicU64,
    /// Delta payload bytes read
    delta_bytes: AtomicU64,
    /// Subscriptions accepted by the worker
    subscriptions: AtomicU64,
    /// Subscriptions rejected for an already-used location
    duplicate_subscriptions: AtomicU64,
}

impl ClientMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment connections opened
    pub fn increment_connections(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment authentication failures
    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one applied delta of `bytes` bytes
    pub fn record_delta(&self, bytes: u64) {
        self.deltas_applied.fetch_add(1, Ordering::Relaxed);
        self.delta_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Increment accepted subscriptions
    pub fn increment_subscriptions(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rejected duplicate subscriptions
    pub fn increment_duplicate_subscriptions(&self) {
        self.duplicate_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get connections opened
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            delta_bytes: self.delta_bytes.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            duplicate_subscriptions: self.duplicate_subscriptions.load(Ordering::Relaxed),
        }
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub auth_failures: u64,
    pub deltas_applied: u64,
    pub delta_bytes: u64,
    pub subscriptions: u64,
    pub duplicate_subscriptions: u64,
}

impl MetricsSnapshot {
    /// Render as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
