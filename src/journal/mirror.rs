//! Directory-backed mirror writer
//!
//! Each journal lives in `<root>/<location>/`:
//! - `_meta.json`: the structure received from the server
//! - `data.d`: every applied delta payload, appended in order
//! - `_txn`: `"<txn> <offset>"`, rewritten after each commit

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use super::errors::{JournalError, JournalResult};
use super::key::JournalKey;
use super::metadata::JournalMetadata;
use super::writer::{writer_handle, JournalState, JournalWriter, WriterFactory, WriterHandle};

const META_FILE: &str = "_meta.json";
const DATA_FILE: &str = "data.d";
const TXN_FILE: &str = "_txn";

/// Creates `MirrorJournalWriter`s under a root directory.
#[derive(Debug, Clone)]
pub struct MirrorWriterFactory {
    root: PathBuf,
}

impl MirrorWriterFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WriterFactory for MirrorWriterFactory {
    fn create_writer(
        &self,
        metadata: &JournalMetadata,
        location: &str,
    ) -> JournalResult<WriterHandle> {
        let writer = MirrorJournalWriter::open(&self.root, metadata, location)?;
        Ok(writer_handle(writer))
    }
}

/// Append-only local copy of a remote journal
#[derive(Debug)]
pub struct MirrorJournalWriter {
    key: JournalKey,
    metadata: JournalMetadata,
    dir: PathBuf,
    data: Option<File>,
    state: JournalState,
}

impl MirrorJournalWriter {
    /// Open or create the journal at `root/location`.
    ///
    /// An existing journal must be loosely compatible with `metadata`.
    pub fn open(root: &Path, metadata: &JournalMetadata, location: &str) -> JournalResult<Self> {
        let dir = root.join(checked_location(location)?);
        fs::create_dir_all(&dir)?;

        let meta_path = dir.join(META_FILE);
        let metadata = if meta_path.exists() {
            let existing = JournalMetadata::from_reader(File::open(&meta_path)?)?;
            if !existing.is_compatible(metadata, false) {
                return Err(JournalError::incompatible(location, &metadata.name));
            }
            existing
        } else {
            fs::write(&meta_path, metadata.to_json()?)?;
            metadata.clone()
        };

        let state = read_state(&dir.join(TXN_FILE))?;
        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(DATA_FILE))?;

        info!(location, txn = state.txn, offset = state.offset, "Opened mirror journal");

        Ok(Self {
            key: metadata.key().with_location(location),
            metadata,
            dir,
            data: Some(data),
            state,
        })
    }

    /// Directory holding the journal files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn persist_state(&self) -> JournalResult<()> {
        let tmp = self.dir.join(format!("{}.tmp", TXN_FILE));
        fs::write(&tmp, format!("{} {}", self.state.txn, self.state.offset))?;
        fs::rename(&tmp, self.dir.join(TXN_FILE))?;
        Ok(())
    }
}

impl JournalWriter for MirrorJournalWriter {
    fn key(&self) -> &JournalKey {
        &self.key
    }

    fn metadata(&self) -> &JournalMetadata {
        &self.metadata
    }

    fn state(&self) -> JournalResult<JournalState> {
        Ok(self.state)
    }

    fn apply_delta(&mut self, delta: &mut dyn Read) -> JournalResult<()> {
        let data = self.data.as_mut().ok_or(JournalError::Closed)?;
        let written = match io::copy(delta, data) {
            Ok(written) => written,
            Err(err) => {
                data.set_len(self.state.offset)?;
                return Err(err.into());
            }
        };
        data.flush()?;

        self.state.txn += 1;
        self.state.offset += written;
        self.persist_state()?;

        debug!(location = %self.dir.display(), bytes = written, txn = self.state.txn, "Applied delta");
        Ok(())
    }

    fn close(&mut self) -> JournalResult<()> {
        if let Some(data) = self.data.take() {
            data.sync_all()?;
        }
        Ok(())
    }
}

fn checked_location(location: &str) -> JournalResult<&Path> {
    let path = Path::new(location);
    let plain = !location.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(path)
    } else {
        Err(JournalError::writer(format!(
            "journal location '{}' must be a relative path",
            location
        )))
    }
}

fn read_state(path: &Path) -> JournalResult<JournalState> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(JournalState::default()),
        Err(err) => return Err(err.into()),
    };
    let mut parts = text.split_whitespace().map(str::parse::<u64>);
    match (parts.next(), parts.next()) {
        (Some(Ok(txn)), Some(Ok(offset))) => Ok(JournalState::new(txn, offset)),
        _ => Err(JournalError::writer(format!(
            "corrupt transaction file {}",
            path.display()
        ))),
    }
}
