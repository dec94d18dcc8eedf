//! State document types
//!
//! These types are serialized to JSON and handed to the downstream consumer
//! between runs. The layout follows the Singer convention:
//!
//! ```json
//! {"bookmarks": {"users": {
//!     "replication_key": "updated_at",
//!     "replication_key_value": "2024-01-04T00:00:00Z",
//!     "replication_key_signpost": "2024-01-05T00:00:00Z",
//!     "partitions": [{"context": {"region": "eu"}, "replication_key_value": "..."}]
//! }}}
//! ```
//!
//! Keys this crate does not know about are kept in `extra` maps at every
//! level so that documents written by newer versions survive a round trip.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, KeyType};
use crate::value::CheckpointValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Note written alongside interim progress markers
pub const PROGRESS_MARKER_NOTE: &str = "Progress is not resumable if interrupted.";

/// Complete persisted state for a tap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    /// Per-stream bookmarks
    #[serde(default)]
    pub bookmarks: BTreeMap<String, Bookmark>,

    /// Unknown top-level keys
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl StateDocument {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))
    }

    /// Parse a document from an already-decoded JSON value
    pub fn from_value(value: JsonValue) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::new());
        }
        serde_json::from_value(value)
            .map_err(|e| Error::state(format!("Failed to parse state document: {e}")))
    }

    /// Encode as a JSON value
    pub fn to_value(&self) -> Result<JsonValue> {
        serde_json::to_value(self)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Get the bookmark for a scope, if present
    pub fn get(&self, scope: &StateScope) -> Option<&Bookmark> {
        let stream = self.bookmarks.get(&scope.stream)?;
        match &scope.partition {
            None => Some(stream),
            Some(context) => stream.get_partition(context),
        }
    }

    /// Get a writeable bookmark for a scope, creating it if needed
    pub fn get_mut(&mut self, scope: &StateScope) -> &mut Bookmark {
        let stream = self.bookmarks.entry(scope.stream.clone()).or_default();
        match &scope.partition {
            None => stream,
            Some(context) => stream.get_partition_mut(context),
        }
    }

    /// Whether no stream has any recorded state
    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}

/// Progress for one stream or one partition of a stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Replication key the value below belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,

    /// Committed checkpoint value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key_value: Option<JsonValue>,

    /// Upper bound resolved for the current run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key_signpost: Option<JsonValue>,

    /// Interim, non-resumable progress of an unsorted stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_markers: Option<ProgressMarkers>,

    /// Per-partition bookmarks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionBookmark>,

    /// Unknown keys
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl Bookmark {
    /// Create a new empty bookmark
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value, if it was recorded for `key` and parses as `key_type`.
    ///
    /// A value recorded under a different replication key is ignored, so a
    /// re-keyed stream starts over instead of resuming from a foreign value.
    pub fn value_for(&self, key: &str, key_type: KeyType) -> Option<CheckpointValue> {
        if self.replication_key.as_deref() != Some(key) {
            return None;
        }
        self.replication_key_value
            .as_ref()
            .and_then(|v| CheckpointValue::from_json(v, key_type))
    }

    /// Record a committed value
    pub fn commit(&mut self, key: &str, value: &CheckpointValue) {
        self.replication_key = Some(key.to_string());
        self.replication_key_value = Some(value.to_json());
    }

    /// Record the signpost for the current run
    pub fn set_signpost(&mut self, signpost: Option<&CheckpointValue>) {
        self.replication_key_signpost = signpost.map(CheckpointValue::to_json);
    }

    /// Record the interim maximum of an unsorted stream
    pub fn write_progress_marker(&mut self, key: &str, value: &CheckpointValue) {
        self.progress_markers = Some(ProgressMarkers {
            note: PROGRESS_MARKER_NOTE.to_string(),
            replication_key: Some(key.to_string()),
            replication_key_value: Some(value.to_json()),
        });
    }

    /// Drop any interim progress markers
    pub fn reset_progress_markers(&mut self) {
        self.progress_markers = None;
    }

    /// Get partition bookmark by context
    pub fn get_partition(&self, context: &JsonObject) -> Option<&Bookmark> {
        self.partitions
            .iter()
            .find(|p| &p.context == context)
            .map(|p| &p.bookmark)
    }

    /// Get mutable partition bookmark, creating if needed
    pub fn get_partition_mut(&mut self, context: &JsonObject) -> &mut Bookmark {
        let index = match self.partitions.iter().position(|p| &p.context == context) {
            Some(index) => index,
            None => {
                self.partitions.push(PartitionBookmark::new(context.clone()));
                self.partitions.len() - 1
            }
        };
        &mut self.partitions[index].bookmark
    }

    /// Contexts of all partitions recorded in this bookmark
    pub fn partition_contexts(&self) -> impl Iterator<Item = &JsonObject> {
        self.partitions.iter().map(|p| &p.context)
    }
}

/// Bookmark for a single partition of a stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionBookmark {
    /// Partition context
    pub context: JsonObject,

    /// Progress within this partition
    #[serde(flatten)]
    pub bookmark: Bookmark,
}

impl PartitionBookmark {
    /// Create an empty partition bookmark
    pub fn new(context: JsonObject) -> Self {
        Self {
            context,
            bookmark: Bookmark::new(),
        }
    }
}

/// Interim progress written while an unsorted stream is extracting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMarkers {
    /// Human-readable warning for anyone reading the state document
    #[serde(rename = "Note", default)]
    pub note: String,

    /// Replication key the interim value belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,

    /// Running maximum observed so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key_value: Option<JsonValue>,
}

/// Addresses the bookmark of a stream or of one of its partitions
#[derive(Debug, Clone, PartialEq)]
pub struct StateScope {
    /// Stream identifier
    pub stream: String,
    /// Partition context, if partitioned
    pub partition: Option<JsonObject>,
}

impl StateScope {
    /// Scope covering a whole stream
    pub fn stream(name: impl Into<String>) -> Self {
        Self {
            stream: name.into(),
            partition: None,
        }
    }

    /// Scope covering one partition of a stream
    pub fn partition(name: impl Into<String>, context: JsonObject) -> Self {
        Self {
            stream: name.into(),
            partition: Some(context),
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            None => f.write_str(&self.stream),
            Some(context) => write!(f, "{}{}", self.stream, JsonValue::Object(context.clone())),
        }
    }
}
