//! Message sinks
//!
//! The transport behind a sink is outside the engine's control. A sink error
//! is fatal for the run; retries belong to the transport.

use super::types::Message;
use crate::error::{Error, Result};
use crate::state::{StateDocument, StateManager};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode one newline-terminated JSON line
pub(crate) fn encode_line<T: serde::Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| Error::emission(format!("Failed to encode message: {e}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Destination for record and state messages
#[async_trait]
pub trait MessageSink: Send {
    /// Hand one message to the transport
    async fn write(&mut self, message: &Message) -> Result<()>;

    /// Flush buffered output
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    async fn write(&mut self, message: &Message) -> Result<()> {
        (**self).write(message).await
    }

    async fn flush(&mut self) -> Result<()> {
        (**self).flush().await
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Collects messages in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Vec<Message>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in arrival order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// State payloads in arrival order
    pub fn states(&self) -> Vec<&StateDocument> {
        self.messages.iter().filter_map(Message::as_state).collect()
    }

    /// Number of record messages
    pub fn record_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_record()).count()
    }

    /// Most recent state payload
    pub fn last_state(&self) -> Option<&StateDocument> {
        self.messages.iter().rev().find_map(Message::as_state)
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn write(&mut self, message: &Message) -> Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}

// ============================================================================
// JSON Lines Sink
// ============================================================================

/// Writes one JSON message per line to any async writer
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageSink for JsonLinesSink<W> {
    async fn write(&mut self, message: &Message) -> Result<()> {
        let line = encode_line(message)?;
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| Error::emission(format!("Failed to write message: {e}")))
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| Error::emission(format!("Failed to flush output: {e}")))
    }
}

// ============================================================================
// State File Sink
// ============================================================================

/// Persists every state message to a file, ignoring records
#[derive(Debug)]
pub struct StateFileSink {
    manager: StateManager,
}

impl StateFileSink {
    /// Persist through the given state manager
    pub fn new(manager: StateManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MessageSink for StateFileSink {
    async fn write(&mut self, message: &Message) -> Result<()> {
        match message.as_state() {
            Some(document) => self
                .manager
                .save(document)
                .await
                .map_err(|e| Error::emission(e.to_string())),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tee Sink
// ============================================================================

/// Forwards every message to two sinks, in order
#[derive(Debug)]
pub struct TeeSink<A, B> {
    first: A,
    second: B,
}

impl<A, B> TeeSink<A, B> {
    /// Combine two sinks
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Split back into the two sinks
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

#[async_trait]
impl<A: MessageSink, B: MessageSink> MessageSink for TeeSink<A, B> {
    async fn write(&mut self, message: &Message) -> Result<()> {
        self.first.write(message).await?;
        self.second.write(message).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.first.flush().await?;
        self.second.flush().await
    }
}
