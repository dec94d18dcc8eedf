//! Config parser and validation
//!
//! Parses and validates tap configuration files.

use crate::config::{StreamConfig, TapConfig};
use crate::error::{Error, Result};
use crate::types::{JsonValue, KeyType};
use crate::value::CheckpointValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load a tap configuration from a YAML or JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<TapConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = fs::read_to_string(path)?;
    let config: TapConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config JSON: {e}")))?,
        _ => serde_yaml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config YAML: {e}")))?,
    };

    validate_config(&config)?;
    Ok(config)
}

/// Load a tap configuration from a YAML string
pub fn load_config_from_str(yaml: &str) -> Result<TapConfig> {
    let config: TapConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse config YAML: {e}")))?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate a tap configuration
pub fn validate_config(config: &TapConfig) -> Result<()> {
    let stream_names: HashSet<_> = config.streams.iter().map(|s| &s.name).collect();
    if stream_names.len() != config.streams.len() {
        return Err(Error::config("Duplicate stream names found"));
    }

    if let Some(start_date) = &config.start_date {
        let raw = JsonValue::String(start_date.clone());
        if CheckpointValue::from_json(&raw, KeyType::Timestamp).is_none() {
            return Err(Error::config(format!(
                "start_date '{start_date}' is not a valid timestamp"
            )));
        }
    }

    for stream in &config.streams {
        validate_stream(stream)?;
    }

    Ok(())
}

/// Validate a stream definition
fn validate_stream(stream: &StreamConfig) -> Result<()> {
    if stream.name.is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    let method = stream.method();
    if !method.uses_bookmark() {
        if stream.is_sorted {
            return Err(Error::stream_config(
                &stream.name,
                format!("is_sorted has no meaning for {method} replication"),
            ));
        }
        return Ok(());
    }

    if stream.key().is_none() {
        return Err(Error::stream_config(
            &stream.name,
            format!("{method} replication requires a replication_key"),
        ));
    }

    // Literal values can only be checked once the key type is known
    if let Some(key_type) = stream.key_type {
        for (field, value) in [("start_value", &stream.start_value), ("signpost", &stream.signpost)] {
            if let Some(value) = value {
                if CheckpointValue::from_json(value, key_type).is_none() {
                    return Err(Error::stream_config(
                        &stream.name,
                        format!("{field} {value} is not a valid {key_type}"),
                    ));
                }
            }
        }
    }

    Ok(())
}
