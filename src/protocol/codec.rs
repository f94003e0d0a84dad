//! Framed Codec
//!
//! Wire layout:
//! - command: 1 byte
//! - integers: big-endian (`i32` version, `u32` index and lengths, `u64` state)
//! - text and byte arrays: `u32` length + bytes (text capped at 64 KiB)
//! - bulk transfer and delta payload: `u64` length + bytes
//! - journal key: name, location flag + location, partition byte, `u32` record hint

use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::trace;

use super::channel::{ForceClose, ProtocolChannel, StreamCloser};
use super::command::{codes, ClientMessage, IndexedJournalKey, IndexedJournalState, ServerCommand};
use super::errors::{NetworkError, NetworkResult};
use crate::journal::{JournalKey, JournalState, PartitionBy};

/// Largest text frame accepted from the server.
pub const MAX_TEXT_LEN: u32 = 64 * 1024;

/// `ProtocolChannel` over any byte stream.
pub struct FramedChannel<S> {
    stream: S,
    peer: String,
    closer: Arc<StreamCloser>,
}

impl<S: Read + Write + Send> FramedChannel<S> {
    /// Wrap `stream`; `closer` is shared with whoever may force-close it.
    pub fn new(stream: S, peer: impl Into<String>, closer: Arc<StreamCloser>) -> Self {
        Self {
            stream,
            peer: peer.into(),
            closer,
        }
    }

    /// Wrap an in-memory stream that has no socket behind it.
    pub fn detached(stream: S, peer: impl Into<String>) -> Self {
        Self::new(stream, peer, Arc::new(StreamCloser::detached()))
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn ensure_open(&self) -> NetworkResult<()> {
        if self.closer.is_closed() {
            Err(NetworkError::Closed)
        } else {
            Ok(())
        }
    }

    fn read_array<const N: usize>(&mut self) -> NetworkResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u32(&mut self) -> NetworkResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> NetworkResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }
}

impl<S: Read + Write + Send> ProtocolChannel for FramedChannel<S> {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn send(&mut self, message: &ClientMessage) -> NetworkResult<()> {
        self.ensure_open()?;
        let mut buf = Vec::with_capacity(64);
        encode_message(message, &mut buf)?;
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        trace!(command = message.name(), bytes = buf.len(), "Sent command");
        Ok(())
    }

    fn read_command(&mut self) -> NetworkResult<ServerCommand> {
        self.ensure_open()?;
        let [byte] = self.read_array::<1>()?;
        Ok(ServerCommand::from_byte(byte))
    }

    fn read_text(&mut self) -> NetworkResult<String> {
        self.ensure_open()?;
        read_text_frame(&mut self.stream)
    }

    fn read_index(&mut self) -> NetworkResult<usize> {
        self.ensure_open()?;
        Ok(self.read_u32()? as usize)
    }

    fn read_bulk(&mut self, sink: &mut dyn Write) -> NetworkResult<u64> {
        self.ensure_open()?;
        let len = self.read_u64()?;
        let copied = io::copy(&mut (&mut self.stream).take(len), sink)?;
        if copied != len {
            return Err(NetworkError::Closed);
        }
        Ok(copied)
    }

    fn delta_stream(&mut self) -> NetworkResult<Box<dyn Read + '_>> {
        self.ensure_open()?;
        let len = self.read_u64()?;
        Ok(Box::new(ExactLengthReader::new(&mut self.stream, len)))
    }

    fn is_open(&self) -> bool {
        !self.closer.is_closed()
    }

    fn close(&mut self) -> NetworkResult<()> {
        self.closer.force_close();
        Ok(())
    }

    fn force_close_handle(&self) -> Arc<dyn ForceClose> {
        self.closer.clone()
    }
}

/// Reader over exactly `len` bytes of `inner`.
///
/// Ends cleanly after `len` bytes. If `inner` runs dry first the read
/// fails with `UnexpectedEof`, so a truncated payload never looks complete.
pub struct ExactLengthReader<R> {
    inner: R,
    len: u64,
    remaining: u64,
}

impl<R: Read> ExactLengthReader<R> {
    pub fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            len,
            remaining: len,
        }
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Read for ExactLengthReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "delta ended after {} of {} bytes",
                    self.len - self.remaining,
                    self.len
                ),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Encode a client message into `buf`.
pub fn encode_message(message: &ClientMessage, buf: &mut Vec<u8>) -> NetworkResult<()> {
    buf.push(message.code());
    match message {
        ClientMessage::ProtocolVersion(version) => buf.extend_from_slice(&version.to_be_bytes()),
        ClientMessage::HandshakeComplete
        | ClientMessage::ClientReady
        | ClientMessage::ClientDisconnect => {}
        ClientMessage::Authorization(token) => put_bytes(buf, token)?,
        ClientMessage::SetKey(indexed) => {
            put_index(buf, indexed.index)?;
            put_key(buf, &indexed.key)?;
        }
        ClientMessage::DeltaRequest(indexed) => {
            put_index(buf, indexed.index)?;
            buf.extend_from_slice(&indexed.state.txn.to_be_bytes());
            buf.extend_from_slice(&indexed.state.offset.to_be_bytes());
        }
    }
    Ok(())
}

/// Decode one client message. This is the server half of the framing.
pub fn decode_message<R: Read>(reader: &mut R) -> NetworkResult<ClientMessage> {
    let mut code = [0u8; 1];
    reader.read_exact(&mut code)?;
    let message = match code[0] {
        codes::PROTOCOL_VERSION => {
            let mut raw = [0u8; 4];
            reader.read_exact(&mut raw)?;
            ClientMessage::ProtocolVersion(i32::from_be_bytes(raw))
        }
        codes::HANDSHAKE_COMPLETE => ClientMessage::HandshakeComplete,
        codes::AUTHORIZATION => ClientMessage::Authorization(read_bytes_frame(reader, u32::MAX)?),
        codes::CLIENT_READY => ClientMessage::ClientReady,
        codes::CLIENT_DISCONNECT => ClientMessage::ClientDisconnect,
        codes::SET_KEY => {
            let index = read_u32_from(reader)? as usize;
            ClientMessage::SetKey(IndexedJournalKey::new(index, read_key(reader)?))
        }
        codes::DELTA_REQUEST => {
            let index = read_u32_from(reader)? as usize;
            let txn = read_u64_from(reader)?;
            let offset = read_u64_from(reader)?;
            ClientMessage::DeltaRequest(IndexedJournalState::new(
                index,
                JournalState::new(txn, offset),
            ))
        }
        other => {
            return Err(NetworkError::protocol(format!(
                "unknown client command 0x{:02x}",
                other
            )))
        }
    };
    Ok(message)
}

fn put_index(buf: &mut Vec<u8>, index: usize) -> NetworkResult<()> {
    let index = u32::try_from(index)
        .map_err(|_| NetworkError::protocol(format!("journal index {} out of range", index)))?;
    buf.extend_from_slice(&index.to_be_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> NetworkResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| NetworkError::protocol("frame larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_key(buf: &mut Vec<u8>, key: &JournalKey) -> NetworkResult<()> {
    put_bytes(buf, key.name.as_bytes())?;
    match &key.location {
        Some(location) => {
            buf.push(1);
            put_bytes(buf, location.as_bytes())?;
        }
        None => buf.push(0),
    }
    buf.push(key.partition_by.as_byte());
    buf.extend_from_slice(&key.record_hint.to_be_bytes());
    Ok(())
}

fn read_u32_from<R: Read>(reader: &mut R) -> NetworkResult<u32> {
    let mut raw = [0u8; 4];
    reader.read_exact(&mut raw)?;
    Ok(u32::from_be_bytes(raw))
}

fn read_u64_from<R: Read>(reader: &mut R) -> NetworkResult<u64> {
    let mut raw = [0u8; 8];
    reader.read_exact(&mut raw)?;
    Ok(u64::from_be_bytes(raw))
}

fn read_bytes_frame<R: Read>(reader: &mut R, limit: u32) -> NetworkResult<Vec<u8>> {
    let len = read_u32_from(reader)?;
    if len > limit {
        return Err(NetworkError::protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, limit
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_text_frame<R: Read>(reader: &mut R) -> NetworkResult<String> {
    let bytes = read_bytes_frame(reader, MAX_TEXT_LEN)?;
    String::from_utf8(bytes).map_err(|_| NetworkError::protocol("text frame is not UTF-8"))
}

fn read_key<R: Read>(reader: &mut R) -> NetworkResult<JournalKey> {
    let name = read_text_frame(reader)?;
    let mut flag = [0u8; 1];
    reader.read_exact(&mut flag)?;
    let location = match flag[0] {
        0 => None,
        _ => Some(read_text_frame(reader)?),
    };
    let mut partition = [0u8; 1];
    reader.read_exact(&mut partition)?;
    let partition_by = PartitionBy::from_byte(partition[0]).ok_or_else(|| {
        NetworkError::protocol(format!("unknown partition type {}", partition[0]))
    })?;
    let record_hint = read_u32_from(reader)?;
    Ok(JournalKey {
        name,
        location,
        partition_by,
        record_hint,
    })
}
