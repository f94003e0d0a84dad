//! Delta applier bound to one subscription index

use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use super::errors::JournalResult;
use super::writer::{with_writer, CommitListener, WriterHandle};

/// Applies deltas to a writer and notifies the subscription's listener.
pub struct DeltaApplier {
    writer: WriterHandle,
    listener: Option<Arc<dyn CommitListener>>,
    applied: u64,
}

impl DeltaApplier {
    pub fn new(writer: WriterHandle, listener: Option<Arc<dyn CommitListener>>) -> Self {
        Self {
            writer,
            listener,
            applied: 0,
        }
    }

    /// Apply one payload. The listener hears about success and failure.
    pub fn apply(&mut self, delta: &mut dyn Read) -> JournalResult<()> {
        match with_writer(&self.writer, |w| w.apply_delta(delta)) {
            Ok(()) => {
                self.applied += 1;
                debug!(applied = self.applied, "Delta committed");
                if let Some(listener) = &self.listener {
                    listener.on_commit();
                }
                Ok(())
            }
            Err(err) => {
                if let Some(listener) = &self.listener {
                    listener.on_error(&err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Deltas committed through this applier.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{
        writer_handle, JournalError, JournalKey, JournalMetadata, JournalState, JournalWriter,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rejecting {
        key: JournalKey,
        metadata: JournalMetadata,
    }

    impl JournalWriter for Rejecting {
        fn key(&self) -> &JournalKey {
            &self.key
        }
        fn metadata(&self) -> &JournalMetadata {
            &self.metadata
        }
        fn state(&self) -> JournalResult<JournalState> {
            Ok(JournalState::default())
        }
        fn apply_delta(&mut self, delta: &mut dyn Read) -> JournalResult<()> {
            let mut first = [0u8; 1];
            delta.read_exact(&mut first)?;
            if first[0] == 0 {
                return Err(JournalError::writer("zero byte"));
            }
            Ok(())
        }
        fn close(&mut self) -> JournalResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counts {
        commits: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CommitListener for Counts {
        fn on_commit(&self) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _reason: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_listener_sees_commit_and_error() {
        let counts = Arc::new(Counts::default());
        let writer = writer_handle(Rejecting {
            key: JournalKey::new("t"),
            metadata: JournalMetadata::new("t"),
        });
        let mut applier = DeltaApplier::new(writer, Some(counts.clone()));

        applier.apply(&mut &[1u8][..]).unwrap();
        assert!(applier.apply(&mut &[0u8][..]).is_err());

        assert_eq!(applier.applied(), 1);
        assert_eq!(counts.commits.load(Ordering::SeqCst), 1);
        assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
    }
}
