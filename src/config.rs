//! Configuration types for tap runs
//!
//! These structures describe, per stream, how replication state is tracked.
//! They are loaded once before a run and passed explicitly into the
//! coordinator; the engine treats them as read-only run parameters.

use crate::types::{JsonObject, JsonValue, KeyType, OptionStringExt, ReplicationMethod};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Top-Level Tap Config
// ============================================================================

/// Complete run configuration loaded from YAML or JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapConfig {
    /// Stream definitions
    #[serde(default)]
    pub streams: Vec<StreamConfig>,

    /// Fallback starting timestamp for timestamp-keyed streams with no bookmark
    #[serde(default)]
    pub start_date: Option<String>,

    /// State emission cadence
    #[serde(default)]
    pub emit: EmitPolicy,

    /// Maximum records per stream (0 = unlimited)
    #[serde(default)]
    pub max_records: usize,

    /// Whether a stream-scoped failure aborts the remaining streams
    #[serde(default)]
    pub fail_fast: bool,
}

impl TapConfig {
    /// Create a config with the given streams
    pub fn new(streams: Vec<StreamConfig>) -> Self {
        Self {
            streams,
            ..Self::default()
        }
    }

    /// Look up a stream by name
    pub fn get_stream(&self, name: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Set the fallback start date
    #[must_use]
    pub fn with_start_date(mut self, start_date: impl Into<String>) -> Self {
        self.start_date = Some(start_date.into());
        self
    }

    /// Set the emission policy
    #[must_use]
    pub fn with_emit_policy(mut self, emit: EmitPolicy) -> Self {
        self.emit = emit;
        self
    }

    /// Set the per-stream record limit
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Set fail fast mode
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Run the structural checks done at load time
    pub fn validate(&self) -> crate::error::Result<()> {
        crate::loader::validate_config(self)
    }
}

// ============================================================================
// Stream Config
// ============================================================================

/// Replication parameters for one stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Unique stream identifier
    pub name: String,

    /// Replication method; inferred from `replication_key` when absent
    #[serde(default)]
    pub replication_method: Option<ReplicationMethod>,

    /// Field used to order records
    #[serde(default)]
    pub replication_key: Option<String>,

    /// Ordering type of the replication key
    #[serde(default)]
    pub key_type: Option<KeyType>,

    /// Source guarantees non-decreasing key order within a run
    #[serde(default)]
    pub is_sorted: bool,

    /// Starting bookmark when no prior state exists
    #[serde(default)]
    pub start_value: Option<JsonValue>,

    /// Static signpost override
    #[serde(default)]
    pub signpost: Option<JsonValue>,

    /// Partition contexts, each tracked with its own bookmark
    #[serde(default)]
    pub partitions: Vec<JsonObject>,
}

impl StreamConfig {
    /// A full-table stream with no bookmark
    pub fn full_table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replication_method: Some(ReplicationMethod::FullTable),
            replication_key: None,
            key_type: None,
            is_sorted: false,
            start_value: None,
            signpost: None,
            partitions: Vec::new(),
        }
    }

    /// An incremental stream on the given key
    pub fn incremental(name: impl Into<String>, key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            replication_method: Some(ReplicationMethod::Incremental),
            replication_key: Some(key.into()),
            key_type: Some(key_type),
            ..Self::full_table(name)
        }
    }

    /// Mark the stream as sorted
    #[must_use]
    pub fn sorted(mut self) -> Self {
        self.is_sorted = true;
        self
    }

    /// Set the replication method explicitly
    #[must_use]
    pub fn with_method(mut self, method: ReplicationMethod) -> Self {
        self.replication_method = Some(method);
        self
    }

    /// Set the starting value
    #[must_use]
    pub fn with_start_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.start_value = Some(value.into());
        self
    }

    /// Set a static signpost
    #[must_use]
    pub fn with_signpost(mut self, value: impl Into<JsonValue>) -> Self {
        self.signpost = Some(value.into());
        self
    }

    /// Add a partition context
    #[must_use]
    pub fn with_partition(mut self, context: JsonObject) -> Self {
        self.partitions.push(context);
        self
    }

    /// Effective replication method
    pub fn method(&self) -> ReplicationMethod {
        match self.replication_method {
            Some(method) => method,
            None if self.key().is_some() => ReplicationMethod::Incremental,
            None => ReplicationMethod::FullTable,
        }
    }

    /// Replication key, ignoring empty strings
    pub fn key(&self) -> Option<&str> {
        self.replication_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Owned replication key
    pub fn key_owned(&self) -> Option<String> {
        self.replication_key.clone().none_if_empty()
    }

    /// Whether this stream carries a bookmark
    pub fn tracks_bookmark(&self) -> bool {
        self.method().uses_bookmark()
    }
}

// ============================================================================
// Emit Policy
// ============================================================================

/// How often mid-stream STATE messages are emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitPolicy {
    /// Emit after this many records (0 = never by count)
    #[serde(default = "default_every_records")]
    pub every_records: usize,

    /// Emit when this many seconds have passed since the last emission
    #[serde(default)]
    pub every_seconds: Option<u64>,
}

fn default_every_records() -> usize {
    10_000
}

impl Default for EmitPolicy {
    fn default() -> Self {
        Self {
            every_records: default_every_records(),
            every_seconds: None,
        }
    }
}

impl EmitPolicy {
    /// Create the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit every `n` records
    #[must_use]
    pub fn with_every_records(mut self, n: usize) -> Self {
        self.every_records = n;
        self
    }

    /// Emit at most this often by wall clock
    #[must_use]
    pub fn with_every_seconds(mut self, secs: u64) -> Self {
        self.every_seconds = Some(secs);
        self
    }

    /// Time-based interval, if configured
    pub fn interval(&self) -> Option<Duration> {
        self.every_seconds.map(Duration::from_secs)
    }
}
