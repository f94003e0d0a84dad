//! Journal replication wire protocol
//!
//! - `command`: command bytes, `ClientMessage`, `ServerCommand`
//! - `channel`: the `ProtocolChannel` seam the session talks through
//! - `codec`: length-prefixed framing over any byte stream
//! - `stats`: byte counting for delta transfers

mod channel;
mod codec;
mod command;
mod errors;
mod stats;
#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ForceClose, ProtocolChannel, StreamCloser};
pub use codec::{decode_message, encode_message, ExactLengthReader, FramedChannel, MAX_TEXT_LEN};
pub use command::{
    codes, ClientMessage, IndexedJournalKey, IndexedJournalState, ServerCommand, ACK_OK,
    AUTH_REQUIRED, PROTOCOL_VERSION,
};
pub use errors::{NetworkError, NetworkResult};
pub use stats::{ConnectionStats, StatsCollectingReader, TransferStats};
