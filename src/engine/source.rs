//! Record sources
//!
//! Pagination, HTTP and database access live behind this trait; the engine
//! only consumes the replication key of each record it is handed.

use crate::config::StreamConfig;
use crate::error::Result;
use crate::types::{JsonObject, JsonValue, KeyType};
use crate::value::CheckpointValue;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::pin::Pin;

/// Type alias for the record stream returned by a source
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<JsonValue>> + Send>>;

/// Produces the records of a stream (or one of its partitions)
#[async_trait]
pub trait RecordSource: Send {
    /// Open the record stream.
    ///
    /// `starting` is the bookmark the run resumes from; sources should use it
    /// to skip data that was already delivered.
    async fn records(
        &mut self,
        stream: &StreamConfig,
        partition: Option<&JsonObject>,
        starting: Option<&CheckpointValue>,
    ) -> Result<RecordStream>;
}

/// In-memory source keyed by stream name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: HashMap<String, Vec<(Option<JsonObject>, JsonValue)>>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to a stream
    pub fn push(&mut self, stream: impl Into<String>, record: JsonValue) {
        self.records
            .entry(stream.into())
            .or_default()
            .push((None, record));
    }

    /// Add a record to one partition of a stream
    pub fn push_partitioned(
        &mut self,
        stream: impl Into<String>,
        partition: JsonObject,
        record: JsonValue,
    ) {
        self.records
            .entry(stream.into())
            .or_default()
            .push((Some(partition), record));
    }

    /// Add many records to a stream (builder form)
    #[must_use]
    pub fn with_records(mut self, stream: &str, records: impl IntoIterator<Item = JsonValue>) -> Self {
        for record in records {
            self.push(stream, record);
        }
        self
    }

    /// Number of buffered records for a stream
    pub fn len(&self, stream: &str) -> usize {
        self.records.get(stream).map_or(0, Vec::len)
    }

    /// Whether no records are buffered at all
    pub fn is_empty(&self) -> bool {
        self.records.values().all(Vec::is_empty)
    }
}

/// Whether a buffered record lies at or after the resume bookmark.
///
/// Records whose key is missing or does not parse are kept; the coordinator
/// decides what to do with them.
fn at_or_after(record: &JsonValue, key: &str, starting: &CheckpointValue, key_type: KeyType) -> bool {
    super::extract_key(record, key)
        .and_then(|raw| CheckpointValue::from_json(raw, key_type))
        .and_then(|value| value.try_cmp(starting).ok())
        .map_or(true, Ordering::is_ge)
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn records(
        &mut self,
        stream: &StreamConfig,
        partition: Option<&JsonObject>,
        starting: Option<&CheckpointValue>,
    ) -> Result<RecordStream> {
        // Resume is inclusive: a record equal to the bookmark is delivered again
        let resume = stream.key().zip(starting).map(|(key, start)| {
            (key, start, stream.key_type.unwrap_or_else(|| start.kind()))
        });

        let records: Vec<Result<JsonValue>> = self
            .records
            .get(&stream.name)
            .map(|all| {
                all.iter()
                    .filter(|(p, _)| p.as_ref() == partition)
                    .filter(|(_, record)| {
                        resume.map_or(true, |(key, start, key_type)| {
                            at_or_after(record, key, start, key_type)
                        })
                    })
                    .map(|(_, record)| Ok(record.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn collect(stream: RecordStream) -> Vec<JsonValue> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_memory_source_skips_records_before_bookmark() {
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);
        let mut source = MemorySource::new().with_records(
            "orders",
            vec![json!({"id": 1}), json!({"id": 3}), json!({"id": 2}), json!({"id": 5}), json!({})],
        );

        let records = source
            .records(&stream, None, Some(&CheckpointValue::Integer(3)))
            .await
            .unwrap();

        assert_eq!(
            collect(records).await,
            vec![json!({"id": 3}), json!({"id": 5}), json!({})]
        );
    }

    #[tokio::test]
    async fn test_memory_source_without_bookmark_replays_everything() {
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);
        let mut source =
            MemorySource::new().with_records("orders", vec![json!({"id": 1}), json!({"id": 2})]);

        let records = source.records(&stream, None, None).await.unwrap();
        assert_eq!(collect(records).await.len(), 2);

        let users = StreamConfig::full_table("orders");
        let records = source
            .records(&users, None, Some(&CheckpointValue::Integer(9)))
            .await
            .unwrap();
        assert_eq!(collect(records).await.len(), 2);
    }
}
