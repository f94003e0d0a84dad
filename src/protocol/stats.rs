//! Transfer statistics for delta streams

use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Reader wrapper that counts bytes and remembers the first read failure.
///
/// The applier only sees an opaque error when a delta fails; the recorded
/// failure tells the session whether the wire or the writer was at fault.
pub struct StatsCollectingReader<R> {
    inner: R,
    bytes: u64,
    started: Instant,
    read_error: Option<io::ErrorKind>,
}

impl<R: Read> StatsCollectingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: 0,
            started: Instant::now(),
            read_error: None,
        }
    }

    /// Bytes read so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Kind of the first failed read, if any.
    pub fn read_error(&self) -> Option<io::ErrorKind> {
        self.read_error
    }

    /// Access the wrapped reader (used to drain an unread remainder).
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Stop the clock.
    pub fn finish(&self) -> TransferStats {
        TransferStats {
            bytes: self.bytes,
            elapsed: self.started.elapsed(),
        }
    }
}

impl<R: Read> Read for StatsCollectingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.bytes += n as u64;
                Ok(n)
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::Interrupted && self.read_error.is_none() {
                    self.read_error = Some(err.kind());
                }
                Err(err)
            }
        }
    }
}

/// Single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Throughput in MB/s; zero when nothing measurable elapsed.
    pub fn megabytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

/// Totals for one physical connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub deltas: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ConnectionStats {
    pub fn record(&mut self, transfer: &TransferStats) {
        self.deltas += 1;
        self.bytes += transfer.bytes;
        self.elapsed += transfer.elapsed;
    }
}
