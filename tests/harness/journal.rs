//! In-memory journals that record what the client does to them

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aerodb_journal_client::journal::{
    writer_handle, CommitListener, JournalError, JournalKey, JournalMetadata, JournalResult,
    JournalState, JournalWriter, WriterFactory, WriterHandle,
};

/// Observable side of a `RecordingWriter`
#[derive(Debug, Default)]
pub struct WriterProbe {
    pub deltas: Mutex<Vec<Vec<u8>>>,
    pub closed: AtomicBool,
}

impl WriterProbe {
    pub fn deltas(&self) -> Vec<Vec<u8>> {
        self.deltas.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct RecordingWriter {
    key: JournalKey,
    metadata: JournalMetadata,
    probe: Arc<WriterProbe>,
}

impl RecordingWriter {
    pub fn new(key: JournalKey, metadata: JournalMetadata) -> (Self, Arc<WriterProbe>) {
        let probe = Arc::new(WriterProbe::default());
        let writer = Self {
            key,
            metadata,
            probe: probe.clone(),
        };
        (writer, probe)
    }

    pub fn handle(key: JournalKey, metadata: JournalMetadata) -> (WriterHandle, Arc<WriterProbe>) {
        let (writer, probe) = Self::new(key, metadata);
        (writer_handle(writer), probe)
    }
}

impl JournalWriter for RecordingWriter {
    fn key(&self) -> &JournalKey {
        &self.key
    }

    fn metadata(&self) -> &JournalMetadata {
        &self.metadata
    }

    fn state(&self) -> JournalResult<JournalState> {
        let deltas = self.probe.deltas.lock().unwrap();
        let offset = deltas.iter().map(|d| d.len() as u64).sum();
        Ok(JournalState::new(deltas.len() as u64, offset))
    }

    fn apply_delta(&mut self, delta: &mut dyn Read) -> JournalResult<()> {
        let mut payload = Vec::new();
        delta.read_to_end(&mut payload)?;
        self.probe.deltas.lock().unwrap().push(payload);
        Ok(())
    }

    fn close(&mut self) -> JournalResult<()> {
        if self.probe.closed.swap(true, Ordering::SeqCst) {
            return Err(JournalError::Closed);
        }
        Ok(())
    }
}

/// Creates `RecordingWriter`s and keeps their probes by location.
#[derive(Clone, Default)]
pub struct RecordingWriterFactory {
    probes: Arc<Mutex<Vec<(String, Arc<WriterProbe>)>>>,
    reject: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, usize>>>,
}

impl RecordingWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report journals created at `location` as incompatible.
    pub fn reject(&self, location: &str) {
        self.reject.lock().unwrap().push(location.to_string());
    }

    /// Fail the next `times` creations at `location` with an I/O error.
    pub fn fail(&self, location: &str, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(location.to_string(), times);
    }

    pub fn probe(&self, location: &str) -> Option<Arc<WriterProbe>> {
        self.probes
            .lock()
            .unwrap()
            .iter()
            .find(|(l, _)| l == location)
            .map(|(_, probe)| probe.clone())
    }

    pub fn created(&self) -> Vec<String> {
        self.probes
            .lock()
            .unwrap()
            .iter()
            .map(|(location, _)| location.clone())
            .collect()
    }
}

impl WriterFactory for RecordingWriterFactory {
    fn create_writer(
        &self,
        metadata: &JournalMetadata,
        location: &str,
    ) -> JournalResult<WriterHandle> {
        if self.reject.lock().unwrap().iter().any(|l| l == location) {
            return Err(JournalError::incompatible(location, metadata.name.as_str()));
        }
        if let Some(left) = self.failures.lock().unwrap().get_mut(location) {
            if *left > 0 {
                *left -= 1;
                return Err(JournalError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
        }
        let key = JournalKey::new(metadata.name.clone()).with_location(location);
        let (handle, probe) = RecordingWriter::handle(key, metadata.clone());
        self.probes
            .lock()
            .unwrap()
            .push((location.to_string(), probe));
        Ok(handle)
    }
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    commits: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl CommitListener for RecordingListener {
    fn on_commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, reason: &str) {
        self.errors.lock().unwrap().push(reason.to_string());
    }
}
