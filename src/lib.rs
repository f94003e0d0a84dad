//! aerodb-journal-client - replicate remote AeroDB journals into local writers
//!
//! - `client`: the replication client, its worker thread and control channel
//! - `protocol`: commands and framing spoken with the journal server
//! - `journal`: keys, metadata and the writer traits deltas are applied to
//! - `net`: connection factories
//! - `auth`: credential providers
//! - `observability`: metrics and logging setup
//! - `cli`: the command-line mirror client

pub mod auth;
pub mod cli;
pub mod client;
pub mod journal;
pub mod net;
pub mod observability;
pub mod protocol;

pub use client::{
    ClientConfig, ClientError, ClientEvent, ClientResult, JournalClient, JournalClientBuilder,
    ReconnectPolicy, Subscription,
};
pub use journal::{CommitListener, JournalKey, JournalWriter, WriterFactory, WriterHandle};
