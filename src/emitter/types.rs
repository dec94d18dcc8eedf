//! Message types
//!
//! Wire format of the messages handed to the downstream consumer.

use crate::state::StateDocument;
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    /// A single extracted record
    Record {
        /// Stream name
        stream: String,
        /// Record body, passed through untouched
        record: JsonValue,
        /// When the record was pulled from the source
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_extracted: Option<DateTime<Utc>>,
    },
    /// Checkpoint carrying the full state document
    State {
        /// State snapshot
        value: StateDocument,
    },
}

impl Message {
    /// Create a record message stamped with the current time
    pub fn record(stream: impl Into<String>, record: JsonValue) -> Self {
        Self::Record {
            stream: stream.into(),
            record,
            time_extracted: Some(Utc::now()),
        }
    }

    /// Create a state message
    pub fn state(value: StateDocument) -> Self {
        Self::State { value }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// State payload, if this is a state message
    pub fn as_state(&self) -> Option<&StateDocument> {
        match self {
            Self::State { value } => Some(value),
            Self::Record { .. } => None,
        }
    }
}
