//! Writer Collaborators
//!
//! The client never interprets delta bytes. It hands each payload to a
//! `JournalWriter` and reports the state the writer claims to be at.
//!
//! Writers are shared as `WriterHandle` so a caller that supplied its own
//! writer keeps using it while the worker applies deltas.

use std::io::Read;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::errors::{JournalError, JournalResult};
use super::key::JournalKey;
use super::metadata::JournalMetadata;

/// Replication position of a local journal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalState {
    /// Last committed transaction
    pub txn: u64,
    /// Payload bytes consumed
    pub offset: u64,
}

impl JournalState {
    pub fn new(txn: u64, offset: u64) -> Self {
        Self { txn, offset }
    }
}

/// Local journal that accepts remote deltas.
pub trait JournalWriter: Send {
    /// Key the journal is stored under.
    fn key(&self) -> &JournalKey;

    /// Structure of the local journal.
    fn metadata(&self) -> &JournalMetadata;

    /// Current position, sent to the server in `DELTA_REQUEST`.
    fn state(&self) -> JournalResult<JournalState>;

    /// Apply one delta payload and commit it.
    ///
    /// The reader is bounded to the payload; any error from it is a
    /// transport failure and should be returned as `JournalError::Io`.
    fn apply_delta(&mut self, delta: &mut dyn Read) -> JournalResult<()>;

    /// Release the journal.
    fn close(&mut self) -> JournalResult<()>;
}

/// Shared, lockable writer
pub type WriterHandle = Arc<Mutex<dyn JournalWriter>>;

/// Wrap a writer into a shareable handle.
pub fn writer_handle<W: JournalWriter + 'static>(writer: W) -> WriterHandle {
    Arc::new(Mutex::new(writer))
}

/// Run `f` with exclusive access to the writer.
pub fn with_writer<T>(
    handle: &WriterHandle,
    f: impl FnOnce(&mut dyn JournalWriter) -> JournalResult<T>,
) -> JournalResult<T> {
    let mut guard = handle
        .lock()
        .map_err(|_| JournalError::writer("journal writer lock poisoned"))?;
    f(&mut *guard)
}

/// Creates writers for journals the caller did not supply.
pub trait WriterFactory: Send + Sync {
    /// Create (or open) the journal at `location` described by `metadata`.
    fn create_writer(
        &self,
        metadata: &JournalMetadata,
        location: &str,
    ) -> JournalResult<WriterHandle>;
}

/// Per-subscription commit notifications. Runs on the worker thread.
pub trait CommitListener: Send + Sync {
    /// A delta was committed.
    fn on_commit(&self);

    /// The subscription failed (duplicate location, delta rejected).
    fn on_error(&self, reason: &str);
}
