//! Scripted journal server
//!
//! Each accepted connection follows a `ConnectionScript`: handshake answers,
//! then a queue of server commands delivered one per `read_command`, then an
//! idle behaviour. Every message the client sends is recorded per session.

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use aerodb_journal_client::journal::JournalMetadata;
use aerodb_journal_client::net::ConnectionFactory;
use aerodb_journal_client::protocol::{
    ClientMessage, ExactLengthReader, ForceClose, NetworkError, NetworkResult, ProtocolChannel,
    ServerCommand,
};

/// Command the server pushes
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Delta { index: usize, payload: Vec<u8> },
    /// Announce `declared` bytes, send `payload`, then hang up
    TruncatedDelta {
        index: usize,
        payload: Vec<u8>,
        declared: u64,
    },
    Ready,
    Heartbeat,
    Shutdown,
    Unknown(u8),
}

/// What the server does once its command queue is empty
#[derive(Debug, Clone, Copy)]
pub enum Idle {
    /// Block until the connection is closed locally
    Block,
    /// Send a heartbeat after every pause
    Heartbeat(Duration),
    /// Hang up
    Close,
}

#[derive(Debug, Clone)]
pub struct ConnectionScript {
    version_ack: String,
    auth_token: Option<Vec<u8>>,
    metadata: HashMap<String, JournalMetadata>,
    commands: Vec<ServerFrame>,
    idle: Idle,
    hang_up_on_set_key: Option<usize>,
}

impl Default for ConnectionScript {
    fn default() -> Self {
        Self {
            version_ack: "OK".to_string(),
            auth_token: None,
            metadata: HashMap::new(),
            commands: Vec::new(),
            idle: Idle::Block,
            hang_up_on_set_key: None,
        }
    }
}

impl ConnectionScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the protocol version with `ack` instead of "OK".
    pub fn version_ack(mut self, ack: &str) -> Self {
        self.version_ack = ack.to_string();
        self
    }

    /// Ask for credentials and accept only `token`.
    pub fn require_token(mut self, token: &[u8]) -> Self {
        self.auth_token = Some(token.to_vec());
        self
    }

    /// Metadata served for journal `name`.
    pub fn metadata(mut self, metadata: JournalMetadata) -> Self {
        self.metadata.insert(metadata.name.clone(), metadata);
        self
    }

    pub fn then(mut self, frame: ServerFrame) -> Self {
        self.commands.push(frame);
        self
    }

    pub fn idle(mut self, idle: Idle) -> Self {
        self.idle = idle;
        self
    }

    /// Hang up instead of receiving the `nth` SET_KEY (counting from 1).
    pub fn hang_up_on_set_key(mut self, nth: usize) -> Self {
        self.hang_up_on_set_key = Some(nth);
        self
    }
}

/// Journal metadata served when a script does not name one.
pub fn default_metadata(name: &str) -> JournalMetadata {
    JournalMetadata::new(name)
        .with_column("ts", "TIMESTAMP")
        .with_column("value", "LONG")
}

#[derive(Default)]
struct LogInner {
    opens: usize,
    sessions: Vec<Vec<ClientMessage>>,
}

/// Shared record of connection attempts and client traffic
#[derive(Clone, Default)]
pub struct ServerLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ServerLog {
    /// Connection attempts, refused ones included.
    pub fn opens(&self) -> usize {
        self.inner.lock().unwrap().opens
    }

    /// Messages per accepted session, in order.
    pub fn sessions(&self) -> Vec<Vec<ClientMessage>> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn session(&self, index: usize) -> Vec<ClientMessage> {
        self.sessions().get(index).cloned().unwrap_or_default()
    }

    /// Every message of every session.
    pub fn all(&self) -> Vec<ClientMessage> {
        self.sessions().into_iter().flatten().collect()
    }

    fn open(&self) {
        self.inner.lock().unwrap().opens += 1;
    }

    fn accept(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.push(Vec::new());
        inner.sessions.len() - 1
    }

    fn record(&self, session: usize, message: &ClientMessage) {
        self.inner.lock().unwrap().sessions[session].push(message.clone());
    }
}

pub enum Outcome {
    Refuse,
    Accept(ConnectionScript),
}

/// Hands out scripted connections in order; once the queue is empty every
/// attempt gets `fallback` (or is refused).
pub struct ScriptedConnectionFactory {
    outcomes: Mutex<VecDeque<Outcome>>,
    fallback: Option<ConnectionScript>,
    log: ServerLog,
}

impl ScriptedConnectionFactory {
    pub fn new(log: ServerLog) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: None,
            log,
        }
    }

    pub fn accept(self, script: ConnectionScript) -> Self {
        self.outcomes.lock().unwrap().push_back(Outcome::Accept(script));
        self
    }

    pub fn refuse(self) -> Self {
        self.outcomes.lock().unwrap().push_back(Outcome::Refuse);
        self
    }

    pub fn otherwise(mut self, script: ConnectionScript) -> Self {
        self.fallback = Some(script);
        self
    }
}

impl ConnectionFactory for ScriptedConnectionFactory {
    fn open(&self) -> NetworkResult<Box<dyn ProtocolChannel>> {
        self.log.open();
        let next = self.outcomes.lock().unwrap().pop_front();
        let script = match next {
            Some(Outcome::Accept(script)) => script,
            Some(Outcome::Refuse) => {
                return Err(NetworkError::ConnectFailed("connection refused".into()))
            }
            None => match &self.fallback {
                Some(script) => script.clone(),
                None => return Err(NetworkError::ConnectFailed("connection refused".into())),
            },
        };
        let session = self.log.accept();
        Ok(Box::new(ScriptedChannel::new(script, self.log.clone(), session)))
    }
}

/// Close flag a blocked read can wait on
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Wait until closed or `timeout` elapses. True if closed.
    fn wait_closed(&self, timeout: Option<Duration>) -> bool {
        let closed = self.closed.lock().unwrap();
        match timeout {
            Some(timeout) => *self.cond.wait_timeout_while(closed, timeout, |c| !*c).unwrap().0,
            None => *self.cond.wait_while(closed, |c| !*c).unwrap(),
        }
    }
}

impl ForceClose for Gate {
    fn force_close(&self) {
        *self.closed.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

pub struct ScriptedChannel {
    script: ConnectionScript,
    commands: VecDeque<ServerFrame>,
    texts: VecDeque<String>,
    bulks: VecDeque<Vec<u8>>,
    pending_delta: Option<PendingDelta>,
    set_keys: usize,
    /// Peer went away; the channel still looks open locally
    hung_up: bool,
    log: ServerLog,
    session: usize,
    gate: Arc<Gate>,
}

struct PendingDelta {
    index: usize,
    payload: Vec<u8>,
    declared: u64,
    hang_up: bool,
}

impl ScriptedChannel {
    fn new(script: ConnectionScript, log: ServerLog, session: usize) -> Self {
        Self {
            commands: script.commands.iter().cloned().collect(),
            script,
            texts: VecDeque::new(),
            bulks: VecDeque::new(),
            pending_delta: None,
            set_keys: 0,
            hung_up: false,
            log,
            session,
            gate: Arc::new(Gate::default()),
        }
    }

    fn ensure_open(&self) -> NetworkResult<()> {
        if self.gate.is_closed() || self.hung_up {
            Err(NetworkError::Closed)
        } else {
            Ok(())
        }
    }

    fn respond(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::ProtocolVersion(_) => self.texts.push_back(self.script.version_ack.clone()),
            ClientMessage::HandshakeComplete => {
                let answer = if self.script.auth_token.is_some() { "AUTH" } else { "OK" };
                self.texts.push_back(answer.to_string());
            }
            ClientMessage::Authorization(token) => {
                let accepted = self.script.auth_token.as_deref() == Some(token.as_slice());
                self.texts
                    .push_back(if accepted { "OK" } else { "DENIED" }.to_string());
            }
            ClientMessage::SetKey(indexed) => {
                self.texts.push_back("OK".to_string());
                let name = &indexed.key.name;
                let metadata = self
                    .script
                    .metadata
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| default_metadata(name));
                self.bulks
                    .push_back(serde_json::to_vec(&metadata).unwrap());
            }
            ClientMessage::DeltaRequest(_) => self.texts.push_back("OK".to_string()),
            ClientMessage::ClientReady | ClientMessage::ClientDisconnect => {}
        }
    }
}

impl ProtocolChannel for ScriptedChannel {
    fn peer(&self) -> &str {
        "scripted"
    }

    fn send(&mut self, message: &ClientMessage) -> NetworkResult<()> {
        self.ensure_open()?;
        if let ClientMessage::SetKey(_) = message {
            self.set_keys += 1;
            if self.script.hang_up_on_set_key == Some(self.set_keys) {
                self.hung_up = true;
                return Err(NetworkError::Closed);
            }
        }
        self.log.record(self.session, message);
        self.respond(message);
        Ok(())
    }

    fn read_command(&mut self) -> NetworkResult<ServerCommand> {
        self.ensure_open()?;
        if let Some(frame) = self.commands.pop_front() {
            return Ok(match frame {
                ServerFrame::Delta { index, payload } => {
                    self.pending_delta = Some(PendingDelta {
                        index,
                        declared: payload.len() as u64,
                        payload,
                        hang_up: false,
                    });
                    ServerCommand::JournalDelta
                }
                ServerFrame::TruncatedDelta {
                    index,
                    payload,
                    declared,
                } => {
                    self.pending_delta = Some(PendingDelta {
                        index,
                        payload,
                        declared,
                        hang_up: true,
                    });
                    ServerCommand::JournalDelta
                }
                ServerFrame::Ready => ServerCommand::ServerReady,
                ServerFrame::Heartbeat => ServerCommand::ServerHeartbeat,
                ServerFrame::Shutdown => ServerCommand::ServerShutdown,
                ServerFrame::Unknown(code) => ServerCommand::Unknown(code),
            });
        }
        match self.script.idle {
            Idle::Block => {
                self.gate.wait_closed(None);
                Err(NetworkError::Closed)
            }
            Idle::Heartbeat(pause) => {
                if self.gate.wait_closed(Some(pause)) {
                    Err(NetworkError::Closed)
                } else {
                    Ok(ServerCommand::ServerHeartbeat)
                }
            }
            Idle::Close => Err(NetworkError::Closed),
        }
    }

    fn read_text(&mut self) -> NetworkResult<String> {
        self.ensure_open()?;
        self.texts
            .pop_front()
            .ok_or_else(|| NetworkError::protocol("no text response scripted"))
    }

    fn read_index(&mut self) -> NetworkResult<usize> {
        self.ensure_open()?;
        self.pending_delta
            .as_ref()
            .map(|delta| delta.index)
            .ok_or_else(|| NetworkError::protocol("no delta scripted"))
    }

    fn read_bulk(&mut self, sink: &mut dyn Write) -> NetworkResult<u64> {
        self.ensure_open()?;
        let bulk = self
            .bulks
            .pop_front()
            .ok_or_else(|| NetworkError::protocol("no bulk transfer scripted"))?;
        sink.write_all(&bulk).map_err(NetworkError::Io)?;
        Ok(bulk.len() as u64)
    }

    fn delta_stream(&mut self) -> NetworkResult<Box<dyn Read + '_>> {
        self.ensure_open()?;
        let delta = self
            .pending_delta
            .take()
            .ok_or_else(|| NetworkError::protocol("no delta scripted"))?;
        self.hung_up = delta.hang_up;
        Ok(Box::new(ExactLengthReader::new(
            Cursor::new(delta.payload),
            delta.declared,
        )))
    }

    fn is_open(&self) -> bool {
        !self.gate.is_closed()
    }

    fn close(&mut self) -> NetworkResult<()> {
        self.gate.force_close();
        Ok(())
    }

    fn force_close_handle(&self) -> Arc<dyn ForceClose> {
        self.gate.clone()
    }
}
