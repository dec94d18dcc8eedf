//! Tests for StateManager

use super::*;
use crate::value::CheckpointValue;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

fn sample_document() -> StateDocument {
    let mut document = StateDocument::new();
    document
        .get_mut(&StateScope::stream("users"))
        .commit("updated_at", &CheckpointValue::Token("2024-01-01".into()));
    document
        .get_mut(&StateScope::stream("orders"))
        .commit("id", &CheckpointValue::Integer(42));
    document
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_state_manager_new() {
    let manager = StateManager::new("/tmp/test-state.json");
    assert!(!manager.is_in_memory());
    assert_eq!(manager.path().to_str().unwrap(), "/tmp/test-state.json");
}

#[test]
fn test_state_manager_in_memory() {
    let manager = StateManager::in_memory();
    assert!(manager.is_in_memory());
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_load_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let manager = StateManager::new(dir.path().join("state.json"));

    let document = manager.load().await.unwrap();
    assert!(document.is_empty());
}

#[tokio::test]
async fn test_load_empty_file_is_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "  \n").unwrap();

    let document = StateManager::new(&path).load().await.unwrap();
    assert!(document.is_empty());
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let manager = StateManager::new(&path);

    let document = sample_document();
    manager.save(&document).await.unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let loaded = StateManager::new(&path).load().await.unwrap();
    assert_eq!(loaded, document);
}

#[tokio::test]
async fn test_load_invalid_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "not json").unwrap();

    let err = assert_err!(StateManager::new(&path).load().await);
    assert!(err.to_string().contains("Failed to parse state JSON"));
}

#[tokio::test]
async fn test_in_memory_save_is_noop() {
    let manager = StateManager::in_memory();
    assert_ok!(manager.save(&sample_document()).await);
    assert!(assert_ok!(manager.load().await).is_empty());
}

// ============================================================================
// Clear Tests
// ============================================================================

#[tokio::test]
async fn test_clear_stream() {
    let dir = tempdir().unwrap();
    let manager = StateManager::new(dir.path().join("state.json"));
    manager.save(&sample_document()).await.unwrap();

    assert!(manager.clear_stream("users").await.unwrap());
    assert!(!manager.clear_stream("users").await.unwrap());

    let loaded = manager.load().await.unwrap();
    assert!(!loaded.bookmarks.contains_key("users"));
    assert!(loaded.bookmarks.contains_key("orders"));
}

#[tokio::test]
async fn test_clear_all() {
    let dir = tempdir().unwrap();
    let manager = StateManager::new(dir.path().join("state.json"));
    manager.save(&sample_document()).await.unwrap();

    manager.clear().await.unwrap();
    assert!(manager.load().await.unwrap().is_empty());
}
