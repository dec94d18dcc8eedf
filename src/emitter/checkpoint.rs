//! State emission cadence
//!
//! Mid-stream checkpoints are rate limited by record count and wall clock.
//! Stream and run completion always emit. A snapshot identical to the last
//! one written is suppressed on the rate-limited path.

use super::sink::MessageSink;
use super::types::Message;
use crate::config::EmitPolicy;
use crate::error::Result;
use crate::state::StateDocument;
use std::time::Instant;
use tracing::debug;

/// Decides when state snapshots are written to the sink
#[derive(Debug, Clone)]
pub struct StateEmitter {
    policy: EmitPolicy,
    records_since_emit: usize,
    last_emit_at: Instant,
    last_emitted: Option<StateDocument>,
    emitted: usize,
}

impl StateEmitter {
    /// Create an emitter with the given policy
    pub fn new(policy: EmitPolicy) -> Self {
        Self {
            policy,
            records_since_emit: 0,
            last_emit_at: Instant::now(),
            last_emitted: None,
            emitted: 0,
        }
    }

    /// Count one processed record towards the cadence
    pub fn record_processed(&mut self) {
        self.records_since_emit += 1;
    }

    /// Whether the cadence calls for a checkpoint now
    pub fn is_due(&self) -> bool {
        let by_count =
            self.policy.every_records > 0 && self.records_since_emit >= self.policy.every_records;
        let by_time = self.records_since_emit > 0
            && self
                .policy
                .interval()
                .is_some_and(|interval| self.last_emit_at.elapsed() >= interval);
        by_count || by_time
    }

    /// Emit a snapshot unless it equals the last one written.
    ///
    /// Returns whether a message was written. Either way the cadence restarts.
    pub async fn emit<S>(&mut self, snapshot: StateDocument, sink: &mut S) -> Result<bool>
    where
        S: MessageSink + ?Sized,
    {
        self.restart_cadence();
        if self.last_emitted.as_ref() == Some(&snapshot) {
            debug!("State unchanged since last checkpoint, skipping");
            return Ok(false);
        }
        self.write(snapshot, sink).await?;
        Ok(true)
    }

    /// Emit a snapshot if the cadence is due
    pub async fn emit_if_due<S>(&mut self, snapshot: impl FnOnce() -> StateDocument, sink: &mut S) -> Result<bool>
    where
        S: MessageSink + ?Sized,
    {
        if !self.is_due() {
            return Ok(false);
        }
        self.emit(snapshot(), sink).await
    }

    /// Always write the snapshot (stream and run completion)
    pub async fn emit_final<S>(&mut self, snapshot: StateDocument, sink: &mut S) -> Result<()>
    where
        S: MessageSink + ?Sized,
    {
        self.restart_cadence();
        self.write(snapshot, sink).await
    }

    /// Number of state messages written
    pub fn emitted_count(&self) -> usize {
        self.emitted
    }

    /// Policy in effect
    pub fn policy(&self) -> &EmitPolicy {
        &self.policy
    }

    fn restart_cadence(&mut self) {
        self.records_since_emit = 0;
        self.last_emit_at = Instant::now();
    }

    async fn write<S>(&mut self, snapshot: StateDocument, sink: &mut S) -> Result<()>
    where
        S: MessageSink + ?Sized,
    {
        let message = Message::state(snapshot);
        sink.write(&message).await?;
        self.emitted += 1;
        if let Message::State { value } = message {
            self.last_emitted = Some(value);
        }
        Ok(())
    }
}
