//! Subscribing journals on the current connection

use std::io::{BufReader, Seek, SeekFrom};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::channel::Subscription;
use super::errors::{ClientError, ClientResult};
use super::events::ClientEvent;
use super::handshake::check_ack;
use super::registry::IndexedJournal;
use super::worker::Worker;
use crate::journal::{
    with_writer, DeltaApplier, JournalError, JournalMetadata, WriterHandle,
};
use crate::protocol::{
    ClientMessage, IndexedJournalKey, IndexedJournalState, NetworkError, ProtocolChannel,
};

impl Worker {
    /// Replay every active subscription, in index order.
    pub(super) fn resubscribe(&mut self) -> ClientResult<()> {
        if self.registry.is_empty() {
            return Ok(());
        }
        debug!(count = self.registry.len(), "Replaying subscriptions");
        for index in 0..self.registry.len() {
            let Some(subscription) = self.registry.subscription(index).cloned() else {
                continue;
            };
            self.subscribe_one(index, subscription, false)?;
        }
        Ok(())
    }

    /// Bind `subscription` to `index` on the server and request its deltas.
    ///
    /// The caller has already reserved the local location of a new
    /// subscription. An incompatible local journal is reported and skipped.
    /// Any other journal failure is a network failure: the connection is
    /// dropped and the subscription is replayed on the next one.
    pub(super) fn subscribe_one(
        &mut self,
        index: usize,
        subscription: Subscription,
        is_new: bool,
    ) -> ClientResult<()> {
        self.bind(index, subscription, is_new).map_err(|err| match err {
            ClientError::Journal(err) => NetworkError::Journal(err).into(),
            other => other,
        })
    }

    fn bind(&mut self, index: usize, subscription: Subscription, is_new: bool) -> ClientResult<()> {
        if is_new {
            let registered = self.registry.register(subscription.clone());
            debug_assert_eq!(registered, index);
            self.metrics.increment_subscriptions();
        }

        let channel = self.channel_mut()?;
        channel.send(&ClientMessage::SetKey(IndexedJournalKey::new(
            index,
            subscription.remote.clone(),
        )))?;
        check_ack(channel)?;
        let metadata = receive_metadata(channel)?;

        let compatible = match self.registry.journal(index) {
            Some(journal) => is_compatible(&journal.writer, &metadata)?,
            None => self.install_journal(index, &subscription, &metadata)?,
        };
        if !compatible {
            self.reject_incompatible(index, &subscription);
            return Ok(());
        }

        self.send_state(index)?;
        info!(index, remote = %subscription.remote, location = subscription.location(), "Subscribed");
        Ok(())
    }

    /// Create or validate the writer for a fresh index. False if the
    /// journal cannot take the remote deltas.
    fn install_journal(
        &mut self,
        index: usize,
        subscription: &Subscription,
        metadata: &JournalMetadata,
    ) -> ClientResult<bool> {
        let (writer, owned) = match &subscription.writer {
            Some(writer) => {
                if !is_compatible(writer, metadata)? {
                    return Ok(false);
                }
                (writer.clone(), false)
            }
            None => {
                let factory = self.writers.as_ref().ok_or_else(|| {
                    ClientError::configuration("no writer factory configured")
                })?;
                match factory.create_writer(metadata, subscription.location()) {
                    Ok(writer) => (writer, true),
                    Err(JournalError::Incompatible { .. }) => return Ok(false),
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let applier = DeltaApplier::new(writer.clone(), subscription.listener.clone());
        self.registry
            .install(index, IndexedJournal::new(writer, applier, owned));
        Ok(true)
    }

    fn reject_incompatible(&mut self, index: usize, subscription: &Subscription) {
        if let Some(journal) = self.registry.journal_mut(index) {
            journal.suspended = true;
            journal.status_sent = false;
        }
        warn!(
            index,
            remote = %subscription.remote,
            location = subscription.location(),
            "Local journal is incompatible with remote"
        );
        subscription.notify_error(
            &ClientError::IncompatibleJournal {
                local: subscription.location().to_string(),
                remote: subscription.remote.to_string(),
            }
            .to_string(),
        );
        // TODO: unsubscribe the index on the server once the protocol has a command for it.
        self.notifier.notify(ClientEvent::IncompatibleJournal);
    }

    /// Send `DELTA_REQUEST` with the writer's current state.
    fn send_state(&mut self, index: usize) -> ClientResult<()> {
        let connection = self.connection.as_mut().ok_or(NetworkError::Closed)?;
        let journal = self
            .registry
            .journal_mut(index)
            .ok_or(ClientError::UnknownJournalIndex(index))?;

        let state = with_writer(&journal.writer, |w| w.state())?;
        connection
            .channel
            .send(&ClientMessage::DeltaRequest(IndexedJournalState::new(index, state)))?;
        check_ack(connection.channel.as_mut())?;
        journal.status_sent = true;
        journal.suspended = false;
        Ok(())
    }
}

fn is_compatible(writer: &WriterHandle, metadata: &JournalMetadata) -> ClientResult<bool> {
    Ok(with_writer(writer, |w| {
        Ok(w.metadata().is_compatible(metadata, false))
    })?)
}

/// Spool the bulk metadata transfer through a temp file and decode it.
fn receive_metadata(channel: &mut dyn ProtocolChannel) -> ClientResult<JournalMetadata> {
    let mut spool = NamedTempFile::new().map_err(JournalError::Io)?;
    let bytes = channel.read_bulk(spool.as_file_mut())?;
    spool
        .as_file_mut()
        .seek(SeekFrom::Start(0))
        .map_err(JournalError::Io)?;

    let metadata = JournalMetadata::from_reader(BufReader::new(spool.as_file()))
        .map_err(|e| NetworkError::protocol(format!("invalid journal metadata: {}", e)))?;
    debug!(journal = %metadata.name, bytes, "Received journal metadata");
    Ok(metadata)
}
