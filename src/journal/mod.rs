//! Local journal collaborators
//!
//! Keys, metadata and the writer traits the replication client drives,
//! plus a directory-backed writer used by the command-line client.

mod applier;
mod errors;
mod key;
mod metadata;
mod mirror;
mod writer;

pub use applier::DeltaApplier;
pub use errors::{JournalError, JournalResult};
pub use key::{JournalKey, PartitionBy};
pub use metadata::{ColumnMetadata, JournalMetadata};
pub use mirror::{MirrorJournalWriter, MirrorWriterFactory};
pub use writer::{
    with_writer, writer_handle, CommitListener, JournalState, JournalWriter, WriterFactory,
    WriterHandle,
};
