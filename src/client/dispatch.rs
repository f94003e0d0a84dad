//! Command Dispatch
//!
//! Steady-state handling of one server command at a time:
//! - `JOURNAL_DELTA`: apply to the indexed journal, clear its request flag
//! - `SERVER_READY`: request deltas for every journal without an
//!   outstanding request and not suspended, then `CLIENT_READY`
//! - `SERVER_HEARTBEAT`: process queued subscribe/halt requests, then
//!   `CLIENT_READY`
//! - `SERVER_SHUTDOWN`: drop the connection and reconnect

use std::io;

use tracing::{debug, info, warn};

use super::channel::SubscriptionRequest;
use super::errors::{ClientError, ClientResult};
use super::handshake::check_ack;
use super::worker::Worker;
use crate::journal::with_writer;
use crate::protocol::{
    ClientMessage, IndexedJournalState, NetworkError, ServerCommand, StatsCollectingReader,
};

/// What the session loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Continue,
    Halt,
    Reconnect,
}

impl Worker {
    /// Read and handle the next server command.
    pub(super) fn dispatch_next(&mut self) -> ClientResult<Dispatch> {
        if self.consumer.has_pending_halt() {
            return Ok(Dispatch::Halt);
        }
        let channel = match self.connection.as_mut() {
            Some(connection) => connection.channel.as_mut(),
            None => return Ok(Dispatch::Reconnect),
        };
        if !channel.is_open() {
            return Ok(Dispatch::Halt);
        }

        let command = channel.read_command()?;
        match command {
            ServerCommand::JournalDelta => self.apply_delta()?,
            ServerCommand::ServerReady => self.request_stale_states()?,
            ServerCommand::ServerHeartbeat => {
                if self.process_subscription_queue()? {
                    return Ok(Dispatch::Halt);
                }
                self.send_client_ready()?;
            }
            ServerCommand::ServerShutdown => {
                info!("Server is shutting down");
                return Ok(Dispatch::Reconnect);
            }
            ServerCommand::Unknown(code) => {
                warn!(code, "Ignoring unknown server command");
            }
        }
        Ok(Dispatch::Continue)
    }

    /// Apply one `JOURNAL_DELTA` frame.
    fn apply_delta(&mut self) -> ClientResult<()> {
        let connection = self.connection.as_mut().ok_or(NetworkError::Closed)?;
        let index = connection.channel.read_index()?;
        let journal = self
            .registry
            .journal_mut(index)
            .ok_or(ClientError::UnknownJournalIndex(index))?;

        let mut reader = StatsCollectingReader::new(connection.channel.delta_stream()?);
        let applied = journal.applier.apply(&mut reader);
        let drained = io::copy(reader.inner_mut(), &mut io::sink());
        let read_error = reader.read_error();
        let transfer = reader.finish();
        drop(reader);

        // A failed read means the payload never fully arrived, whatever the
        // writer reported.
        if let Some(kind) = read_error {
            warn!(index, bytes = transfer.bytes, "Delta transfer interrupted");
            return Err(NetworkError::from(io::Error::from(kind)).into());
        }
        applied?;
        drained.map_err(NetworkError::from)?;

        journal.status_sent = false;
        connection.stats.record(&transfer);
        self.metrics.record_delta(transfer.bytes);
        debug!(
            index,
            bytes = transfer.bytes,
            mb_per_sec = transfer.megabytes_per_second(),
            "Applied delta"
        );
        Ok(())
    }

    /// Request deltas for every installed journal whose flags are clear.
    fn request_stale_states(&mut self) -> ClientResult<()> {
        let connection = self.connection.as_mut().ok_or(NetworkError::Closed)?;
        for (index, journal) in self.registry.journals_mut() {
            if journal.status_sent || journal.suspended {
                continue;
            }
            let state = with_writer(&journal.writer, |w| w.state())?;
            connection
                .channel
                .send(&ClientMessage::DeltaRequest(IndexedJournalState::new(index, state)))?;
            check_ack(connection.channel.as_mut())?;
            journal.status_sent = true;
            debug!(index, txn = state.txn, "Requested delta");
        }
        connection.channel.send(&ClientMessage::ClientReady)?;
        Ok(())
    }

    pub(super) fn send_client_ready(&mut self) -> ClientResult<()> {
        self.channel_mut()?.send(&ClientMessage::ClientReady)?;
        Ok(())
    }

    /// Drain the subscription channel into the backlog and work through it.
    ///
    /// Returns true when a halt was requested. A failure leaves the
    /// unprocessed tail in the backlog for the next heartbeat.
    pub(super) fn process_subscription_queue(&mut self) -> ClientResult<bool> {
        let batch = self.consumer.drain();
        self.backlog.extend(batch);

        while let Some(request) = self.backlog.pop_front() {
            let subscription = match request {
                SubscriptionRequest::Halt => return Ok(true),
                SubscriptionRequest::Subscribe(subscription) => subscription,
            };

            let location = subscription.location().to_string();
            if !self.registry.reserve_location(&location) {
                let err = ClientError::DuplicateSubscription(location.clone());
                warn!(location = %location, remote = %subscription.remote, "Rejecting duplicate subscription");
                self.metrics.increment_duplicate_subscriptions();
                subscription.notify_error(&err.to_string());
                continue;
            }

            let index = self.registry.next_index();
            self.subscribe_one(index, subscription, true)?;
        }
        Ok(false)
    }
}
