//! Config loader module
//!
//! Parse tap run configuration from YAML or JSON files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `load_config` - Load and validate a config file (format chosen by extension)
//! - `load_config_from_str` - Parse and validate inline YAML (a JSON superset)
//! - `validate_config` - Structural checks run before any stream starts

mod parser;

pub use parser::{load_config, load_config_from_str, validate_config};
