//! State file persistence
//!
//! Loads and saves state documents with atomic writes. Used by the CLI and
//! by the file sink; the engine itself never touches the filesystem.

use super::types::StateDocument;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// File-backed persistence for state documents
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Path to the state file (empty = in-memory)
    path: PathBuf,
}

impl StateManager {
    /// Create a state manager for the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
        }
    }

    /// Load the document from file; a missing file yields an empty document
    pub async fn load(&self) -> Result<StateDocument> {
        if self.is_in_memory() || !self.path.exists() {
            return Ok(StateDocument::new());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;

        if contents.trim().is_empty() {
            return Ok(StateDocument::new());
        }

        StateDocument::from_json_str(&contents)
    }

    /// Save a document to the state file
    pub async fn save(&self, document: &StateDocument) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        Ok(())
    }

    /// Remove a stream's bookmarks from the state file
    pub async fn clear_stream(&self, stream: &str) -> Result<bool> {
        let mut document = self.load().await?;
        let removed = document.bookmarks.remove(stream).is_some();
        if removed {
            self.save(&document).await?;
        }
        Ok(removed)
    }

    /// Remove all bookmarks from the state file
    pub async fn clear(&self) -> Result<()> {
        self.save(&StateDocument::new()).await
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}
