//! Per-connection state and the cross-thread close hook

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::protocol::{ConnectionStats, ForceClose, ProtocolChannel};

/// One physical connection, rebuilt on every reconnect
pub struct ConnectionState {
    pub channel: Box<dyn ProtocolChannel>,
    pub stats: ConnectionStats,
}

impl ConnectionState {
    pub fn new(channel: Box<dyn ProtocolChannel>) -> Self {
        Self {
            channel,
            stats: ConnectionStats::default(),
        }
    }

    /// Close the channel and log what was transferred over it.
    pub fn close(mut self) {
        if let Err(err) = self.channel.close() {
            debug!(error = %err, "Channel close failed");
        }
        info!(
            peer = self.channel.peer(),
            deltas = self.stats.deltas,
            bytes = self.stats.bytes,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "Connection closed"
        );
    }
}

/// Holds the force-close handle of the current connection so `halt()` can
/// unblock a worker stuck in a read.
#[derive(Default)]
pub struct CloserSlot {
    current: Mutex<Option<Arc<dyn ForceClose>>>,
}

impl CloserSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, closer: Arc<dyn ForceClose>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(closer);
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Close the current connection, if any. Returns true if one was closed.
    pub fn force_close(&self) -> bool {
        let closer = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match closer {
            Some(closer) => {
                closer.force_close();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StreamCloser;

    #[test]
    fn test_slot_closes_current_connection() {
        let slot = CloserSlot::new();
        assert!(!slot.force_close());

        let closer = Arc::new(StreamCloser::detached());
        slot.set(closer.clone());
        assert!(slot.force_close());
        assert!(closer.is_closed());

        slot.clear();
        assert!(!slot.force_close());
    }
}
