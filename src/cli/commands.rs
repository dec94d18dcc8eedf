//! CLI commands and argument parsing

use crate::types::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy replication state CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-state")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tap configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (JSON)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON (takes precedence over --state when loading)
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level implied by the flags
    pub fn log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay records through the engine, writing RECORD and STATE lines
    Read {
        /// Newline-delimited `{"stream": .., "record": ..}` input (default: stdin)
        #[arg(short, long)]
        records: Option<PathBuf>,

        /// Streams to sync (comma-separated, empty = all)
        #[arg(long)]
        streams: Option<String>,

        /// Maximum records per stream
        #[arg(long)]
        max_records: Option<usize>,

        /// Stop at the first stream that fails
        #[arg(long)]
        fail_fast: bool,
    },

    /// Validate the tap configuration
    Validate,

    /// Forget bookmarks in the state file
    Reset {
        /// Stream to reset (default: all streams)
        #[arg(long)]
        stream: Option<String>,
    },
}
