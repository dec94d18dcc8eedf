// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy State
//!
//! Incremental replication state and signpost engine for Singer-style taps.
//!
//! ## Features
//!
//! - **Bookmarks**: Per-stream (and per-partition) checkpoints that only move
//!   forward and are always safe to resume from
//! - **Signposts**: A per-run upper bound so records arriving mid-run are
//!   picked up next time instead of skipped
//! - **Sorted / Unsorted Streams**: Record-by-record checkpoints when the
//!   source is ordered, commit-on-completion when it is not
//! - **State Emission**: Rate-limited STATE messages, always after a stream
//!   completes
//! - **Interruption Safety**: Cancellation, source failures and record limits
//!   leave the last safe bookmark in place
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_state::{
//!     config::{StreamConfig, TapConfig},
//!     emitter::JsonLinesSink,
//!     engine::{MemorySource, RunCoordinator},
//!     types::KeyType,
//! };
//!
//! #[tokio::main]
//! async fn main() -> solidafy_state::Result<()> {
//!     let config = TapConfig::new(vec![
//!         StreamConfig::incremental("orders", "updated_at", KeyType::Timestamp).sorted(),
//!     ]);
//!
//!     let mut source = MemorySource::new();
//!     let mut sink = JsonLinesSink::stdout();
//!
//!     let state = RunCoordinator::new(config)
//!         .run(&mut source, &mut sink)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Run Coordinator                         │
//! │   NOT_STARTED → EXTRACTING → COMPLETED | INTERRUPTED          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//! ┌────────────┬────────────────┼───────────────┬────────────────┐
//! │ Signpost   │ Tracker        │ Store         │ Emitter        │
//! ├────────────┼────────────────┼───────────────┼────────────────┤
//! │ Override   │ Sorted         │ Bookmarks     │ Cadence        │
//! │ Static     │ Unsorted       │ Partitions    │ JSON lines     │
//! │ Run start  │ Clamp          │ Reset         │ State file     │
//! └────────────┴────────────────┴───────────────┴────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Ordered checkpoint values
pub mod value;

/// Run and stream configuration
pub mod config;

/// Config file loading and validation
pub mod loader;

/// Bookmark store and state persistence
pub mod state;

/// Per-run upper bounds
pub mod signpost;

/// Sorted and unsorted bookmark tracking
pub mod tracker;

/// STATE/RECORD message emission
pub mod emitter;

/// Run coordination
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{EmitPolicy, StreamConfig, TapConfig};
pub use engine::{RunCoordinator, StreamOutcome, StreamPhase};
pub use loader::{load_config, load_config_from_str};
pub use state::{BookmarkStore, StateDocument};
pub use value::CheckpointValue;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
