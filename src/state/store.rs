//! Bookmark store
//!
//! Single-writer, in-memory map from stream to bookmark. The store performs
//! no ordering checks; monotonicity is the tracker's job.

use super::types::{Bookmark, StateDocument, StateScope};
use crate::error::Result;
use crate::types::{JsonObject, JsonValue};

/// In-memory bookmark store owned by the active run
#[derive(Debug, Clone, Default)]
pub struct BookmarkStore {
    document: StateDocument,
}

impl BookmarkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a prior document
    pub fn from_document(document: StateDocument) -> Self {
        Self { document }
    }

    /// Load persisted values from a prior state document.
    ///
    /// Streams present in `prior` replace the store's entries for those
    /// streams; streams absent from `prior` are left alone. Unknown top-level
    /// keys are carried over.
    pub fn merge(&mut self, prior: StateDocument) {
        let StateDocument { bookmarks, extra } = prior;
        self.document.bookmarks.extend(bookmarks);
        self.document.extra.extend(extra);
    }

    /// Copy only the named streams' entries from `document`.
    ///
    /// Used to combine the output of coordinators that each own a disjoint
    /// set of streams: every other entry in `document` is the owner's stale
    /// prior copy and is ignored. Top-level keys are left alone.
    pub fn merge_streams<'a>(
        &mut self,
        document: StateDocument,
        streams: impl IntoIterator<Item = &'a str>,
    ) {
        let StateDocument { mut bookmarks, .. } = document;
        for stream in streams {
            if let Some(bookmark) = bookmarks.remove(stream) {
                self.document.bookmarks.insert(stream.to_string(), bookmark);
            }
        }
    }

    /// Merge a prior state given as raw JSON
    pub fn merge_value(&mut self, prior: JsonValue) -> Result<()> {
        self.merge(StateDocument::from_value(prior)?);
        Ok(())
    }

    /// Get the stream-level bookmark
    pub fn get(&self, stream: &str) -> Option<&Bookmark> {
        self.document.bookmarks.get(stream)
    }

    /// Replace the stream-level bookmark
    pub fn set(&mut self, stream: &str, bookmark: Bookmark) {
        self.document.bookmarks.insert(stream.to_string(), bookmark);
    }

    /// Get the bookmark for a stream or partition
    pub fn get_scoped(&self, scope: &StateScope) -> Option<&Bookmark> {
        self.document.get(scope)
    }

    /// Get a writeable bookmark for a stream or partition, creating if needed
    pub fn scoped_mut(&mut self, scope: &StateScope) -> &mut Bookmark {
        self.document.get_mut(scope)
    }

    /// Partition contexts recorded for a stream in prior state
    pub fn partitions(&self, stream: &str) -> Vec<JsonObject> {
        self.get(stream)
            .map(|b| b.partition_contexts().cloned().collect())
            .unwrap_or_default()
    }

    /// Read-only copy of the current document
    pub fn snapshot(&self) -> StateDocument {
        self.document.clone()
    }

    /// Borrow the current document without copying
    pub fn document(&self) -> &StateDocument {
        &self.document
    }

    /// Forget everything recorded for a stream.
    ///
    /// This is the only operation allowed to move a committed checkpoint
    /// backwards.
    pub fn reset(&mut self, stream: &str) -> bool {
        self.document.bookmarks.remove(stream).is_some()
    }

    /// Forget all streams
    pub fn reset_all(&mut self) {
        self.document = StateDocument::new();
    }

    /// Consume the store, returning its document
    pub fn into_document(self) -> StateDocument {
        self.document
    }
}
