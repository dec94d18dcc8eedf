//! State management module
//!
//! Holds the bookmark store and the persisted state document.
//! State is handed to the consumer between runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `StateDocument` - Serializable per-stream (and per-partition) bookmarks
//! - `BookmarkStore` - Single-writer in-memory store owned by a run
//! - `StateManager` - File-based state persistence with atomic writes

mod manager;
mod store;
mod types;

pub use manager::StateManager;
pub use store::BookmarkStore;
pub use types::{
    Bookmark, PartitionBookmark, ProgressMarkers, StateDocument, StateScope,
    PROGRESS_MARKER_NOTE,
};

#[cfg(test)]
mod manager_tests;
