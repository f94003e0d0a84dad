//! Journal Metadata
//!
//! Structural description of a journal, sent by the server after `SET_KEY`
//! as a JSON document. Used to create local writers and to check that an
//! existing local journal can accept the remote deltas.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::errors::{JournalError, JournalResult};
use super::key::{JournalKey, PartitionBy};

/// One column of a journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub column_type: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Journal structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalMetadata {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub partition_by: PartitionBy,
    #[serde(default)]
    pub record_hint: u32,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
}

impl JournalMetadata {
    /// Metadata with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            partition_by: PartitionBy::Default,
            record_hint: 0,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, column_type: impl Into<String>) -> Self {
        self.columns.push(ColumnMetadata::new(name, column_type));
        self
    }

    pub fn with_partition_by(mut self, partition_by: PartitionBy) -> Self {
        self.partition_by = partition_by;
        self
    }

    /// Decode from a JSON stream.
    pub fn from_reader<R: Read>(reader: R) -> JournalResult<Self> {
        let metadata: Self = serde_json::from_reader(reader)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> JournalResult<Self> {
        let metadata: Self = serde_json::from_slice(bytes)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Encode as pretty JSON.
    pub fn to_json(&self) -> JournalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Key describing this journal.
    pub fn key(&self) -> JournalKey {
        JournalKey {
            name: self.name.clone(),
            location: self.location.clone(),
            partition_by: self.partition_by,
            record_hint: self.record_hint,
        }
    }

    fn validate(&self) -> JournalResult<()> {
        if self.name.is_empty() {
            return Err(JournalError::InvalidMetadata(
                "journal name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Check whether deltas for `other` can be applied to this journal.
    ///
    /// Loose compatibility compares the column layout only. Strict
    /// compatibility also requires the same partitioning and record hint.
    pub fn is_compatible(&self, other: &JournalMetadata, strict: bool) -> bool {
        if self.columns != other.columns {
            return false;
        }
        !strict || (self.partition_by == other.partition_by && self.record_hint == other.record_hint)
    }
}
