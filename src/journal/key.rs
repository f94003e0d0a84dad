//! Journal identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Partitioning scheme of a journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionBy {
    None,
    Day,
    Month,
    Year,
    /// Whatever the journal was created with
    #[default]
    Default,
}

impl PartitionBy {
    /// Wire byte.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Day => 1,
            Self::Month => 2,
            Self::Year => 3,
            Self::Default => 4,
        }
    }

    /// Decode a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::Day),
            2 => Some(Self::Month),
            3 => Some(Self::Year),
            4 => Some(Self::Default),
            _ => None,
        }
    }
}

/// Identifies a journal on one side of the replication link.
///
/// The same physical journal may be known under different keys remotely
/// and locally. The local key's derived location must be unique among
/// active subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JournalKey {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub partition_by: PartitionBy,
    #[serde(default)]
    pub record_hint: u32,
}

impl JournalKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            partition_by: PartitionBy::Default,
            record_hint: 0,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_partition_by(mut self, partition_by: PartitionBy) -> Self {
        self.partition_by = partition_by;
        self
    }

    pub fn with_record_hint(mut self, record_hint: u32) -> Self {
        self.record_hint = record_hint;
        self
    }

    /// Storage location: the explicit location, else the name.
    pub fn derived_location(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for JournalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) if location != &self.name => write!(f, "{}@{}", self.name, location),
            _ => write!(f, "{}", self.name),
        }
    }
}
