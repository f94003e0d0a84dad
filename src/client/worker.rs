//! Worker Thread
//!
//! Owns the connection, the registry and every per-index journal. Caller
//! threads reach it only through the subscription channel and the halt
//! signal.
//!
//! Lifecycle:
//! 1. emit `Running`
//! 2. reconnect under the policy whenever disconnected
//! 3. dispatch server commands until a terminal cause
//! 4. shut down: disconnect, release journals, emit the cause and
//!    `Terminated`, close the channel, release the halt signal

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::channel::{SubscriptionConsumer, SubscriptionRequest};
use super::config::ReconnectPolicy;
use super::connection::{CloserSlot, ConnectionState};
use super::dispatch::Dispatch;
use super::errors::{ClientError, ClientResult};
use super::events::{ClientEvent, EventNotifier, HaltSignal};
use super::handshake::{authenticate, send_protocol_version};
use super::reconnect::{ConnectTarget, ReconnectExecutor, ReconnectOutcome};
use super::registry::SubscriptionRegistry;
use crate::auth::CredentialProvider;
use crate::journal::WriterFactory;
use crate::net::ConnectionFactory;
use crate::observability::ClientMetrics;
use crate::protocol::{ClientMessage, NetworkError, ProtocolChannel};

/// Session progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Authenticating,
    Resubscribing,
    Ready,
    Terminated,
}

/// Collaborators and shared state handed over by the client at start
pub(crate) struct WorkerParts {
    pub policy: ReconnectPolicy,
    pub consumer: SubscriptionConsumer,
    pub connections: Arc<dyn ConnectionFactory>,
    pub writers: Option<Arc<dyn WriterFactory>>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub notifier: EventNotifier,
    pub metrics: Arc<ClientMetrics>,
    pub closer: Arc<CloserSlot>,
    pub running: Arc<AtomicBool>,
    pub halt_signal: Arc<HaltSignal>,
}

pub(crate) struct Worker {
    pub(super) policy: ReconnectPolicy,
    pub(super) consumer: SubscriptionConsumer,
    /// Requests drained from the channel but not processed yet
    pub(super) backlog: VecDeque<SubscriptionRequest>,
    pub(super) registry: SubscriptionRegistry,
    pub(super) connection: Option<ConnectionState>,
    pub(super) connections: Arc<dyn ConnectionFactory>,
    pub(super) writers: Option<Arc<dyn WriterFactory>>,
    pub(super) credentials: Option<Arc<dyn CredentialProvider>>,
    pub(super) notifier: EventNotifier,
    pub(super) metrics: Arc<ClientMetrics>,
    pub(super) closer: Arc<CloserSlot>,
    pub(super) running: Arc<AtomicBool>,
    pub(super) halt_signal: Arc<HaltSignal>,
    pub(super) state: SessionState,
}

impl Worker {
    pub(crate) fn new(parts: WorkerParts) -> Self {
        Self {
            policy: parts.policy,
            consumer: parts.consumer,
            backlog: VecDeque::new(),
            registry: SubscriptionRegistry::new(),
            connection: None,
            connections: parts.connections,
            writers: parts.writers,
            credentials: parts.credentials,
            notifier: parts.notifier,
            metrics: parts.metrics,
            closer: parts.closer,
            running: parts.running,
            halt_signal: parts.halt_signal,
            state: SessionState::Disconnected,
        }
    }

    /// Thread body.
    pub(crate) fn run(mut self) {
        self.consumer.start();
        self.notifier.notify(ClientEvent::Running);

        let cause = match panic::catch_unwind(AssertUnwindSafe(|| self.run_session())) {
            Ok(cause) => cause,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "Journal client worker panicked");
                ClientEvent::ClientException
            }
        };
        self.shutdown(cause);
    }

    /// Reconnect and dispatch until a terminal cause.
    fn run_session(&mut self) -> ClientEvent {
        loop {
            if self.connection.is_none() {
                let executor = ReconnectExecutor::new(self.policy);
                match executor.run(self) {
                    ReconnectOutcome::Connected => {}
                    ReconnectOutcome::Exhausted => return ClientEvent::ServerError,
                    ReconnectOutcome::Halted => return ClientEvent::ClientHalt,
                    ReconnectOutcome::AuthConfigFailed(err) => {
                        error!(error = %err, "Cannot authenticate");
                        return ClientEvent::AuthConfigError;
                    }
                    ReconnectOutcome::Failed(err) => {
                        error!(error = %err, "Connect failed");
                        return terminal_cause(&err);
                    }
                }
            }

            match self.dispatch_next() {
                Ok(Dispatch::Continue) => {}
                Ok(Dispatch::Halt) => return ClientEvent::ClientHalt,
                Ok(Dispatch::Reconnect) => self.disconnect(),
                Err(err) if err.is_network() => {
                    if self.closed_locally() {
                        info!("Connection closed by halt");
                        return ClientEvent::ClientHalt;
                    }
                    warn!(error = %err, "Connection lost");
                    self.disconnect();
                }
                Err(err) => {
                    error!(error = %err, "Replication failed");
                    return terminal_cause(&err);
                }
            }
        }
    }

    fn closed_locally(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(false, |connection| !connection.channel.is_open())
    }

    /// Channel of the current connection.
    pub(super) fn channel_mut(&mut self) -> ClientResult<&mut dyn ProtocolChannel> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection.channel.as_mut()),
            None => Err(NetworkError::Closed.into()),
        }
    }

    pub(super) fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Session state");
            self.state = next;
        }
    }

    /// Drop the current connection, if any.
    pub(super) fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.closer.clear();
            connection.close();
        }
        self.transition(SessionState::Disconnected);
    }

    fn shutdown(mut self, cause: ClientEvent) {
        if let Some(mut connection) = self.connection.take() {
            if connection.channel.is_open() {
                if let Err(err) = connection.channel.send(&ClientMessage::ClientDisconnect) {
                    debug!(error = %err, "Disconnect notice not delivered");
                }
            }
            self.closer.clear();
            connection.close();
        }
        self.registry.release();
        self.transition(SessionState::Terminated);

        self.notifier.notify(cause);
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify(ClientEvent::Terminated);
        self.consumer.close();
        self.halt_signal.release();
        info!(cause = %cause, "Journal client stopped");
    }
}

impl ConnectTarget for Worker {
    fn attempt(&mut self) -> ClientResult<()> {
        self.disconnect();

        self.transition(SessionState::Connecting);
        let channel = self.connections.open()?;
        self.closer.set(channel.force_close_handle());
        info!(peer = channel.peer(), "Connected, starting handshake");
        self.connection = Some(ConnectionState::new(channel));

        self.transition(SessionState::Handshaking);
        send_protocol_version(self.channel_mut()?)?;

        self.transition(SessionState::Authenticating);
        let credentials = self.credentials.clone();
        authenticate(self.channel_mut()?, credentials.as_deref())?;

        self.transition(SessionState::Resubscribing);
        self.resubscribe()?;
        self.send_client_ready()?;

        self.transition(SessionState::Ready);
        self.metrics.increment_connections();
        Ok(())
    }

    fn halt_requested(&mut self) -> bool {
        self.backlog
            .iter()
            .any(|request| matches!(request, SubscriptionRequest::Halt))
            || self.consumer.has_pending_halt()
    }

    fn notify(&self, event: ClientEvent) {
        if event == ClientEvent::AuthError {
            self.metrics.increment_auth_failures();
        }
        self.notifier.notify(event);
    }
}

/// Event reported for a failure that ends the worker.
fn terminal_cause(err: &ClientError) -> ClientEvent {
    match err {
        ClientError::IncompatibleJournal { .. } => ClientEvent::IncompatibleJournal,
        ClientError::AuthenticationConfig | ClientError::AuthenticationProvider(_) => {
            ClientEvent::AuthConfigError
        }
        _ => ClientEvent::ClientException,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::channel::{Subscription, SubscriptionChannel};
    use crate::journal::{JournalError, JournalKey};
    use crate::protocol::NetworkResult;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Unreachable {
        opens: AtomicUsize,
    }

    impl ConnectionFactory for Unreachable {
        fn open(&self) -> NetworkResult<Box<dyn ProtocolChannel>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err(NetworkError::ConnectFailed("unreachable".into()))
        }
    }

    fn disconnected_worker(connections: Arc<Unreachable>) -> Worker {
        let (_publisher, consumer) = SubscriptionChannel::with_capacity(4);
        Worker::new(WorkerParts {
            policy: ReconnectPolicy::new(3, 1, 0),
            consumer,
            connections,
            writers: None,
            credentials: None,
            notifier: EventNotifier::new(None),
            metrics: Arc::new(ClientMetrics::new()),
            closer: Arc::new(CloserSlot::new()),
            running: Arc::new(AtomicBool::new(true)),
            halt_signal: Arc::new(HaltSignal::new()),
        })
    }

    fn subscribe(name: &str) -> SubscriptionRequest {
        let key = JournalKey::new(name);
        SubscriptionRequest::Subscribe(Subscription::new(key.clone(), key))
    }

    #[test]
    fn test_backlogged_halt_stops_reconnect_before_connecting() {
        let connections = Arc::new(Unreachable::default());
        let mut worker = disconnected_worker(connections.clone());
        worker.backlog.push_back(subscribe("trades"));
        worker.backlog.push_back(SubscriptionRequest::Halt);

        assert!(worker.halt_requested());
        let outcome = ReconnectExecutor::new(worker.policy).run(&mut worker);

        assert!(matches!(outcome, ReconnectOutcome::Halted));
        assert_eq!(connections.opens.load(Ordering::SeqCst), 0);
        assert_eq!(worker.backlog.len(), 2);
    }

    #[test]
    fn test_backlogged_subscriptions_do_not_stop_reconnect() {
        let connections = Arc::new(Unreachable::default());
        let mut worker = disconnected_worker(connections.clone());
        worker.backlog.push_back(subscribe("trades"));

        assert!(!worker.halt_requested());
        let outcome = ReconnectExecutor::new(worker.policy).run(&mut worker);

        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        assert_eq!(connections.opens.load(Ordering::SeqCst), 3);
        assert_eq!(worker.backlog.len(), 1);
    }

    #[test]
    fn test_terminal_cause_mapping() {
        assert_eq!(
            terminal_cause(&JournalError::incompatible("a", "b").into()),
            ClientEvent::IncompatibleJournal
        );
        assert_eq!(
            terminal_cause(&ClientError::AuthenticationConfig),
            ClientEvent::AuthConfigError
        );
        assert_eq!(
            terminal_cause(&ClientError::UnknownJournalIndex(3)),
            ClientEvent::ClientException
        );
    }
}
