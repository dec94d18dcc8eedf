//! Tests for emitter module

use super::*;
use crate::config::EmitPolicy;
use crate::error::{Error, Result};
use crate::state::{StateDocument, StateManager, StateScope};
use crate::value::CheckpointValue;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn document(value: i64) -> StateDocument {
    let mut document = StateDocument::new();
    document
        .get_mut(&StateScope::stream("users"))
        .commit("id", &CheckpointValue::Integer(value));
    document
}

/// Sink whose transport always rejects
struct RejectingSink;

#[async_trait]
impl MessageSink for RejectingSink {
    async fn write(&mut self, _message: &Message) -> Result<()> {
        Err(Error::emission("transport closed"))
    }
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_state_message_wire_format() {
    let message = Message::state(document(7));
    assert!(message.is_state());
    assert!(!message.is_record());

    assert_eq!(
        serde_json::to_value(&message).unwrap(),
        json!({
            "type": "STATE",
            "value": { "bookmarks": { "users": { "replication_key": "id", "replication_key_value": 7 } } }
        })
    );
}

#[test]
fn test_record_message_wire_format() {
    let message = Message::record("users", json!({"id": 1}));
    assert!(message.is_record());

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["type"], "RECORD");
    assert_eq!(value["stream"], "users");
    assert_eq!(value["record"], json!({"id": 1}));
    assert!(value["time_extracted"].is_string());

    let decoded: Message = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, message);
}

// ============================================================================
// Cadence Tests
// ============================================================================

#[test]
fn test_due_by_record_count() {
    let mut emitter = StateEmitter::new(EmitPolicy::new().with_every_records(3));
    assert!(!emitter.is_due());

    emitter.record_processed();
    emitter.record_processed();
    assert!(!emitter.is_due());

    emitter.record_processed();
    assert!(emitter.is_due());
}

#[test]
fn test_zero_count_disables_count_trigger() {
    let mut emitter = StateEmitter::new(EmitPolicy::new().with_every_records(0));
    for _ in 0..100 {
        emitter.record_processed();
    }
    assert!(!emitter.is_due());
}

#[tokio::test]
async fn test_due_by_interval() {
    let mut emitter = StateEmitter::new(
        EmitPolicy::new()
            .with_every_records(0)
            .with_every_seconds(0),
    );
    // No records since last emission: nothing to checkpoint yet
    assert!(!emitter.is_due());

    emitter.record_processed();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(emitter.is_due());
}

#[tokio::test]
async fn test_emit_resets_cadence() {
    let mut emitter = StateEmitter::new(EmitPolicy::new().with_every_records(1));
    let mut sink = MemorySink::new();

    emitter.record_processed();
    assert!(emitter.emit_if_due(|| document(1), &mut sink).await.unwrap());
    assert!(!emitter.is_due());
    assert!(!emitter.emit_if_due(|| document(2), &mut sink).await.unwrap());
    assert_eq!(sink.states().len(), 1);
}

// ============================================================================
// Idempotence Tests
// ============================================================================

#[tokio::test]
async fn test_unchanged_snapshot_is_suppressed() {
    let mut emitter = StateEmitter::new(EmitPolicy::new());
    let mut sink = MemorySink::new();

    assert!(emitter.emit(document(1), &mut sink).await.unwrap());
    assert!(!emitter.emit(document(1), &mut sink).await.unwrap());
    assert!(emitter.emit(document(2), &mut sink).await.unwrap());

    assert_eq!(emitter.emitted_count(), 2);
    assert_eq!(sink.states(), vec![&document(1), &document(2)]);
}

#[tokio::test]
async fn test_final_emission_always_writes_same_payload() {
    let mut emitter = StateEmitter::new(EmitPolicy::new());
    let mut sink = MemorySink::new();

    emitter.emit(document(5), &mut sink).await.unwrap();
    emitter.emit_final(document(5), &mut sink).await.unwrap();

    // Repeated payloads are identical, so a consumer applying both is a no-op
    let states = sink.states();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], states[1]);
}

// ============================================================================
// Sink Tests
// ============================================================================

#[tokio::test]
async fn test_emission_failure_propagates() {
    let mut emitter = StateEmitter::new(EmitPolicy::new());
    let err = emitter
        .emit(document(1), &mut RejectingSink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Emission { .. }));
    assert_eq!(emitter.emitted_count(), 0);
}

#[test]
fn test_encode_failure_is_an_emission_error() {
    // JSON object keys must be strings
    let unencodable: std::collections::HashMap<(i32, i32), i32> = [((1, 2), 3)].into();
    let err = super::sink::encode_line(&unencodable).unwrap_err();
    assert!(matches!(err, Error::Emission { .. }));

    let line = super::sink::encode_line(&Message::record("users", json!({"id": 1}))).unwrap();
    assert_eq!(line.last(), Some(&b'\n'));
}

#[tokio::test]
async fn test_json_lines_sink() {
    let mut sink = JsonLinesSink::new(Vec::new());
    sink.write(&Message::record("users", json!({"id": 1})))
        .await
        .unwrap();
    sink.write(&Message::state(document(1))).await.unwrap();
    sink.flush().await.unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "RECORD");
    assert_eq!(lines[1]["type"], "STATE");
}

#[tokio::test]
async fn test_state_file_sink_persists_states_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut sink = StateFileSink::new(StateManager::new(&path));

    sink.write(&Message::record("users", json!({"id": 1})))
        .await
        .unwrap();
    assert!(!path.exists());

    sink.write(&Message::state(document(3))).await.unwrap();
    let saved = StateManager::new(&path).load().await.unwrap();
    assert_eq!(saved, document(3));
}

#[tokio::test]
async fn test_tee_sink_forwards_to_both() {
    let mut first = MemorySink::new();
    let mut second = MemorySink::new();
    {
        let mut tee = TeeSink::new(&mut first, &mut second);
        tee.write(&Message::state(document(1))).await.unwrap();
        tee.flush().await.unwrap();
    }
    assert_eq!(first.messages(), second.messages());
    assert_eq!(first.last_state(), Some(&document(1)));
}
