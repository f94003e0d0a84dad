//! Journal Replication Client
//!
//! `JournalClient` mirrors remote journals into local writers. All protocol
//! work happens on one background worker thread; the handle is safe to
//! share between threads.
//!
//! # Usage
//!
//! ```ignore
//! use aerodb_journal_client::client::{ClientConfig, ClientEvent, JournalClient};
//! use aerodb_journal_client::journal::{JournalKey, MirrorWriterFactory};
//!
//! let client = JournalClient::builder(ClientConfig::default())
//!     .writer_factory(MirrorWriterFactory::new("./mirror"))
//!     .on_event(|event: ClientEvent| println!("{}", event))
//!     .build()?;
//! client.subscribe_journal(JournalKey::new("trades"))?;
//! client.start()?;
//! // ...
//! client.halt();
//! ```

mod channel;
mod config;
mod connection;
mod dispatch;
mod errors;
mod events;
mod handshake;
mod reconnect;
mod registry;
mod subscribe;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::auth::CredentialProvider;
use crate::journal::{CommitListener, JournalKey, WriterFactory, WriterHandle, with_writer};
use crate::net::{ConnectionFactory, TcpConnectionFactory};
use crate::observability::{ClientMetrics, MetricsSnapshot};

pub use channel::{
    Subscription, SubscriptionChannel, SubscriptionConsumer, SubscriptionPublisher,
    SubscriptionRequest, DEFAULT_CAPACITY,
};
pub use config::{ClientConfig, ReconnectPolicy};
pub use connection::{CloserSlot, ConnectionState};
pub use errors::{ClientError, ClientResult};
pub use events::{ClientEvent, EventCallback, EventNotifier, HaltSignal};
pub use handshake::{authenticate, check_ack, send_protocol_version};
pub use reconnect::{ConnectTarget, ReconnectExecutor, ReconnectOutcome};
pub use registry::{IndexedJournal, SubscriptionRegistry};
pub use worker::SessionState;

use worker::{Worker, WorkerParts};

const WORKER_THREAD_NAME: &str = "journal-client";

/// Handle to a replication client
pub struct JournalClient {
    config: ClientConfig,
    publisher: SubscriptionPublisher,
    /// Taken by `start`
    worker: Mutex<Option<Worker>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    halt_signal: Arc<HaltSignal>,
    closer: Arc<CloserSlot>,
    running: Arc<AtomicBool>,
    metrics: Arc<ClientMetrics>,
    has_writer_factory: bool,
}

impl JournalClient {
    pub fn builder(config: ClientConfig) -> JournalClientBuilder {
        JournalClientBuilder::new(config)
    }

    /// Spawn the worker thread.
    pub fn start(&self) -> ClientResult<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ClientError::AlreadyStarted)?;

        self.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!(client_id = %self.config.client_id, "Journal client started");
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ClientError::Worker(err.to_string()))
            }
        }
    }

    /// Subscribe `remote` into the local journal `local`. A writer is
    /// created from the server's metadata.
    pub fn subscribe(
        &self,
        remote: JournalKey,
        local: JournalKey,
        listener: Option<Arc<dyn CommitListener>>,
    ) -> ClientResult<()> {
        let mut subscription = Subscription::new(remote, local);
        subscription.listener = listener;
        self.submit(subscription)
    }

    /// Subscribe a journal under the same key on both sides.
    pub fn subscribe_journal(&self, key: JournalKey) -> ClientResult<()> {
        self.submit(Subscription::new(key.clone(), key))
    }

    /// Subscribe `remote` into a caller-owned writer. The writer is
    /// validated against the server's metadata and never closed by the
    /// client.
    pub fn subscribe_with_writer(
        &self,
        remote: JournalKey,
        writer: WriterHandle,
        listener: Option<Arc<dyn CommitListener>>,
    ) -> ClientResult<()> {
        let local = with_writer(&writer, |w| Ok(w.key().clone()))?;
        let mut subscription = Subscription::new(remote, local).with_writer(writer);
        subscription.listener = listener;
        self.submit(subscription)
    }

    /// Queue an arbitrary subscription.
    pub fn submit(&self, subscription: Subscription) -> ClientResult<()> {
        if subscription.writer.is_none() && !self.has_writer_factory {
            return Err(ClientError::configuration(
                "subscription has no writer and no writer factory is configured",
            ));
        }
        self.publisher
            .publish(SubscriptionRequest::Subscribe(subscription))
    }

    /// Stop the worker and wait for teardown.
    ///
    /// Returns true if teardown finished within the halt timeout. Otherwise
    /// the current connection is force-closed to unblock the worker and
    /// false is returned.
    pub fn halt(&self) -> bool {
        match self.publisher.publish(SubscriptionRequest::Halt) {
            Ok(()) | Err(ClientError::NotRunning) => {}
            Err(err) => warn!(error = %err, "Could not queue halt request"),
        }
        if self.halt_signal.wait_timeout(self.config.halt_timeout()) {
            return true;
        }
        warn!(
            timeout_ms = self.config.halt_timeout_ms,
            "Halt timed out, closing connection"
        );
        self.closer.force_close();
        false
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wait for the worker thread to finish. Returns immediately if it was
    /// never started.
    pub fn join(&self) -> ClientResult<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| ClientError::Worker("worker thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for JournalClient {
    fn drop(&mut self) {
        if self.is_running() {
            self.halt();
        }
    }
}

/// Assembles a `JournalClient`
pub struct JournalClientBuilder {
    config: ClientConfig,
    writer_factory: Option<Arc<dyn WriterFactory>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    on_event: Option<Arc<dyn EventCallback>>,
}

impl JournalClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            writer_factory: None,
            connection_factory: None,
            credentials: None,
            on_event: None,
        }
    }

    /// Factory for journals subscribed without a caller-supplied writer.
    pub fn writer_factory<F: WriterFactory + 'static>(mut self, factory: F) -> Self {
        self.writer_factory = Some(Arc::new(factory));
        self
    }

    /// Replace the TCP factory built from the configuration.
    pub fn connection_factory<F: ConnectionFactory + 'static>(mut self, factory: F) -> Self {
        self.connection_factory = Some(Arc::new(factory));
        self
    }

    pub fn credentials<P: CredentialProvider + 'static>(mut self, provider: P) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    pub fn on_event<C: EventCallback + 'static>(mut self, callback: C) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ClientResult<JournalClient> {
        self.config.validate()?;

        let (publisher, consumer) =
            SubscriptionChannel::new(DEFAULT_CAPACITY, self.config.publish_timeout());
        let connections = match self.connection_factory {
            Some(factory) => factory,
            None => Arc::new(TcpConnectionFactory::from_config(&self.config)),
        };
        let halt_signal = Arc::new(HaltSignal::new());
        let closer = Arc::new(CloserSlot::new());
        let running = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(ClientMetrics::new());
        let has_writer_factory = self.writer_factory.is_some();

        let worker = Worker::new(WorkerParts {
            policy: self.config.reconnect_policy,
            consumer,
            connections,
            writers: self.writer_factory,
            credentials: self.credentials,
            notifier: EventNotifier::new(self.on_event),
            metrics: metrics.clone(),
            closer: closer.clone(),
            running: running.clone(),
            halt_signal: halt_signal.clone(),
        });

        Ok(JournalClient {
            config: self.config,
            publisher,
            worker: Mutex::new(Some(worker)),
            handle: Mutex::new(None),
            halt_signal,
            closer,
            running,
            metrics,
            has_writer_factory,
        })
    }
}
