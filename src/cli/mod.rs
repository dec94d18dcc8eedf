//! CLI module
//!
//! Command-line interface for replaying records through the state engine.
//!
//! # Commands
//!
//! - `read` - Run the engine over JSON-lines input, emitting RECORD/STATE lines
//! - `validate` - Check a tap configuration
//! - `reset` - Forget bookmarks in a state file

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
