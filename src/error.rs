//! Error types for Solidafy State
//!
//! This module defines the error hierarchy for the state engine.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for the state engine
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config for stream '{stream}': {message}")]
    InvalidStreamConfig { stream: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Replication Key Errors
    // ============================================================================
    #[error("Stream '{stream}': replication key value {value} is not a valid {expected}")]
    KeyTypeMismatch {
        stream: String,
        expected: String,
        value: String,
    },

    #[error("Cannot compare checkpoint values of different kinds: {left} vs {right}")]
    IncomparableValues { left: String, right: String },

    // ============================================================================
    // Signpost Errors
    // ============================================================================
    #[error("Signpost resolution failed for stream '{stream}': {message}")]
    SignpostResolution { stream: String, message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Checkpoint emission failed: {message}")]
    Emission { message: String },

    // ============================================================================
    // Run Control
    // ============================================================================
    #[error("Stream '{stream}' not found in configuration")]
    StreamNotFound { stream: String },

    #[error("Stream '{stream}' cannot transition from {from} to {to}")]
    InvalidTransition {
        stream: String,
        from: String,
        to: String,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a per-stream config error
    pub fn stream_config(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidStreamConfig {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a key type mismatch error
    pub fn key_mismatch(
        stream: impl Into<String>,
        expected: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::KeyTypeMismatch {
            stream: stream.into(),
            expected: expected.into(),
            value: value.into(),
        }
    }

    /// Create a signpost resolution error
    pub fn signpost(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SignpostResolution {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create an emission error
    pub fn emission(message: impl Into<String>) -> Self {
        Self::Emission {
            message: message.into(),
        }
    }

    /// Whether this error only aborts the stream it occurred in.
    ///
    /// Stream-scoped errors leave the stream's state untouched and the run
    /// continues with the next stream. Everything else ends the run.
    pub fn is_stream_scoped(&self) -> bool {
        matches!(
            self,
            Error::SignpostResolution { .. }
                | Error::KeyTypeMismatch { .. }
                | Error::IncomparableValues { .. }
        )
    }
}

/// Result type alias for Solidafy State
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::signpost("users", "no override");
        assert_eq!(
            err.to_string(),
            "Signpost resolution failed for stream 'users': no override"
        );

        let err = Error::key_mismatch("orders", "integer", "\"abc\"");
        assert_eq!(
            err.to_string(),
            "Stream 'orders': replication key value \"abc\" is not a valid integer"
        );
    }

    #[test]
    fn test_is_stream_scoped() {
        assert!(Error::signpost("s", "m").is_stream_scoped());
        assert!(Error::key_mismatch("s", "integer", "x").is_stream_scoped());

        assert!(!Error::emission("closed").is_stream_scoped());
        assert!(!Error::state("bad").is_stream_scoped());
        assert!(!Error::config("bad").is_stream_scoped());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
