//! Catalog entity types.
//!
//! A catalog is nothing but a log of [`FileEvent`]s. The current state of a
//! path is derived from its latest event; nothing is ever rewritten.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of state transition recorded for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Path appeared (first sighting, or re-appeared after a delete)
    Create,
    /// Content changed since the previous event
    Update,
    /// Path is gone from disk (tombstone)
    Delete,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::Create, EventType::Update, EventType::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether a path whose latest event has this type is present on disk.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable observation of a file's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub event_type: EventType,
    /// Catalog-relative path, always `/`-separated
    pub file_path: String,
    /// Run timestamp (milliseconds since Unix epoch)
    pub time: i64,
    /// Free-text label of the pipeline instance that produced the event
    pub storage_location: String,
    /// Content digest, or the fingerprint failure sentinel
    pub fingerprint: String,
}

impl FileEvent {
    pub fn new(
        event_type: EventType,
        file_path: impl Into<String>,
        time: i64,
        storage_location: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            file_path: file_path.into(),
            time,
            storage_location: storage_location.into(),
            fingerprint: fingerprint.into(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.event_type.is_live()
    }
}
