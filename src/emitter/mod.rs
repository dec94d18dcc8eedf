//! State emission module
//!
//! Serializes bookmark snapshots into checkpoint messages and hands them,
//! together with record messages, to a downstream sink.
//!
//! # Overview
//!
//! The emitter module provides:
//! - `Message` - Singer-style RECORD / STATE messages
//! - `MessageSink` - Destination trait; the engine only produces payloads
//! - `StateEmitter` - Emission cadence (record count / wall clock) and
//!   suppression of unchanged snapshots
//! - `MemorySink`, `JsonLinesSink`, `StateFileSink`, `TeeSink` - Built-in sinks

mod checkpoint;
mod sink;
mod types;

pub use checkpoint::StateEmitter;
pub use sink::{JsonLinesSink, MemorySink, MessageSink, StateFileSink, TeeSink};
pub use types::Message;

#[cfg(test)]
mod tests;
