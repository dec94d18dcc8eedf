//! Common types used throughout Solidafy State
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Replication Method
// ============================================================================

/// How a stream is replicated between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    /// Re-read everything on every run, no bookmark
    #[default]
    FullTable,
    /// Resume from the replication key bookmark
    Incremental,
    /// Resume from a log position carried in the replication key
    LogBased,
}

impl ReplicationMethod {
    /// Whether this method tracks a replication key bookmark
    pub fn uses_bookmark(self) -> bool {
        matches!(self, Self::Incremental | Self::LogBased)
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FullTable => "FULL_TABLE",
            Self::Incremental => "INCREMENTAL",
            Self::LogBased => "LOG_BASED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Replication Key Type
// ============================================================================

/// The single ordering type of a stream's replication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// RFC 3339 / ISO 8601 datetime
    Timestamp,
    /// Signed 64-bit integer
    Integer,
    /// Floating point number
    Number,
    /// Opaque string token, ordered lexicographically
    String,
}

impl KeyType {
    /// Whether the signpost defaults to the run start time
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::Timestamp)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timestamp => "timestamp",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for connector messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}
