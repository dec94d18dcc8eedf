//! Engine types
//!
//! Stream lifecycle, run statistics, and cancellation.

use crate::types::JsonValue;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of one stream within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// Not yet started (or aborted before extraction began)
    #[default]
    NotStarted,
    /// Records are being pulled and observed
    Extracting,
    /// Pass finished and bookmark committed (terminal)
    Completed,
    /// Pass stopped early; bookmark left at its last safe value (terminal)
    Interrupted,
}

impl StreamPhase {
    /// Whether no further transitions are allowed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Extracting => "EXTRACTING",
            Self::Completed => "COMPLETED",
            Self::Interrupted => "INTERRUPTED",
        };
        f.write_str(name)
    }
}

/// Why a stream stopped before completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
    /// External cancellation
    Cancelled,
    /// Per-stream record limit reached
    MaxRecords(usize),
    /// The record source failed
    SourceFailed(String),
    /// A record's key did not match the stream's key type
    InvalidKey(String),
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::MaxRecords(limit) => write!(f, "max record limit ({limit}) reached"),
            Self::SourceFailed(e) => write!(f, "record source failed: {e}"),
            Self::InvalidKey(e) => write!(f, "{e}"),
        }
    }
}

/// Result of syncing one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Stream name
    pub stream: String,
    /// Final phase
    pub phase: StreamPhase,
    /// Records delivered downstream
    pub records: usize,
    /// Stream-level bookmark after the run (partitioned streams report per
    /// partition in the state document instead)
    pub bookmark: Option<JsonValue>,
    /// Why the stream did not complete, if it did not
    pub error: Option<String>,
}

impl StreamOutcome {
    pub(crate) fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            phase: StreamPhase::NotStarted,
            records: 0,
            bookmark: None,
            error: None,
        }
    }

    /// Whether the stream completed
    pub fn is_completed(&self) -> bool {
        self.phase == StreamPhase::Completed
    }
}

/// Statistics from a run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Records delivered downstream
    pub records_synced: usize,
    /// Records whose key was missing or null
    pub keys_missing: usize,
    /// Sorted-stream values below the current bookmark
    pub out_of_order: usize,
    /// Values capped at the signpost
    pub clamped: usize,
    /// STATE messages written
    pub states_emitted: usize,
    /// Streams that completed
    pub streams_completed: usize,
    /// Streams that were interrupted
    pub streams_interrupted: usize,
    /// Streams that failed before extraction
    pub streams_failed: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finished stream by its outcome
    pub fn add_outcome(&mut self, outcome: &StreamOutcome) {
        match outcome.phase {
            StreamPhase::Completed => self.streams_completed += 1,
            StreamPhase::Interrupted => self.streams_interrupted += 1,
            StreamPhase::NotStarted | StreamPhase::Extracting => self.streams_failed += 1,
        }
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Create a connected cancel handle and signal
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        CancelSignal { rx: Some(rx) },
    )
}

/// Requests cancellation of a run
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the coordinator between records
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending::<()>().await;
        };
        // A dropped handle can no longer cancel
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
