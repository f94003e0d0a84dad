//! Protocol Channel Abstraction
//!
//! The session state machine never touches bytes directly. It talks to the
//! server through `ProtocolChannel`, a set of framed read/write primitives.
//! `FramedChannel` is the stock implementation over any byte stream; tests
//! and embedders can supply their own.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::command::{ClientMessage, ServerCommand};
use super::errors::NetworkResult;

/// Framed conversation with a journal server.
///
/// Owned by the worker thread for the lifetime of one physical connection.
pub trait ProtocolChannel: Send {
    /// Remote peer description for logs.
    fn peer(&self) -> &str;

    /// Write one command with its payload.
    fn send(&mut self, message: &ClientMessage) -> NetworkResult<()>;

    /// Block until the next server command arrives.
    fn read_command(&mut self) -> NetworkResult<ServerCommand>;

    /// Read a short text response (acknowledgements, handshake answers).
    fn read_text(&mut self) -> NetworkResult<String>;

    /// Read a subscription index.
    fn read_index(&mut self) -> NetworkResult<usize>;

    /// Stream a bulk transfer into `sink`, returning the byte count.
    fn read_bulk(&mut self, sink: &mut dyn Write) -> NetworkResult<u64>;

    /// Reader bounded to the next delta payload.
    ///
    /// A payload cut short by the peer must fail with `UnexpectedEof`
    /// rather than end early. Whatever the consumer leaves unread must be
    /// drained by the caller before the next read.
    fn delta_stream(&mut self) -> NetworkResult<Box<dyn Read + '_>>;

    /// False once the channel was closed locally.
    fn is_open(&self) -> bool;

    /// Close the channel from the owning thread.
    fn close(&mut self) -> NetworkResult<()>;

    /// Handle that can close the channel from any thread, unblocking reads.
    fn force_close_handle(&self) -> Arc<dyn ForceClose>;
}

/// Cross-thread close hook
pub trait ForceClose: Send + Sync {
    fn force_close(&self);
}

/// Close flag shared between a channel and its force-close handle, optionally
/// backed by the socket so a blocked read wakes up.
#[derive(Debug)]
pub struct StreamCloser {
    closed: AtomicBool,
    socket: Option<TcpStream>,
}

impl StreamCloser {
    /// Closer with no socket behind it (in-memory streams).
    pub fn detached() -> Self {
        Self {
            closed: AtomicBool::new(false),
            socket: None,
        }
    }

    /// Closer that shuts down `socket` (usually a `try_clone` of the stream).
    pub fn for_socket(socket: TcpStream) -> Self {
        Self {
            closed: AtomicBool::new(false),
            socket: Some(socket),
        }
    }

    /// Check if the channel was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ForceClose for StreamCloser {
    fn force_close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(socket) = &self.socket {
            if let Err(err) = socket.shutdown(Shutdown::Both) {
                debug!(error = %err, "Socket shutdown failed");
            }
        }
    }
}
