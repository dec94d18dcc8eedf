//! Execution engine module
//!
//! Drives each stream's extraction loop and keeps its bookmark safe.
//!
//! # Overview
//!
//! The engine module provides:
//! - `RunCoordinator` - Owns the bookmark store for one run, resolves
//!   signposts, feeds record keys to trackers, and emits checkpoints
//! - `RecordSource` - Collaborator producing records per stream/partition
//! - `StreamPhase` - `NOT_STARTED -> EXTRACTING -> COMPLETED | INTERRUPTED`
//! - `CancelHandle` / `CancelSignal` - External cancellation
//!
//! Streams run one after another and share no mutable state. A host that
//! wants cross-stream parallelism runs one coordinator per stream and folds
//! each coordinator's [`RunCoordinator::owned_snapshot`] into a shared
//! document with `BookmarkStore::merge_streams`. Plain `merge` of full
//! snapshots would write one coordinator's stale prior copy of a stream over
//! another coordinator's progress.

mod source;
mod types;

pub use source::{MemorySource, RecordSource, RecordStream};
pub use types::{
    cancellation, CancelHandle, CancelSignal, InterruptReason, RunStats, StreamOutcome,
    StreamPhase,
};

use crate::config::{StreamConfig, TapConfig};
use crate::emitter::{Message, MessageSink, StateEmitter};
use crate::error::{Error, Result};
use crate::signpost::{SignpostRequest, SignpostResolver};
use crate::state::{BookmarkStore, StateDocument, StateScope};
use crate::tracker::{BookmarkTracker, Observation, StreamTracker};
use crate::types::{JsonValue, KeyType};
use crate::value::CheckpointValue;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tracker plus the key it tracks, for one bookmarked scope
#[derive(Debug)]
struct Tracking {
    key: String,
    key_type: KeyType,
    tracker: StreamTracker,
}

/// How one scope's extraction ended
enum ScopeEnd {
    Completed,
    Interrupted(InterruptReason),
}

/// Result of waiting for the next record
enum Pulled {
    Cancelled,
    Next(Option<Result<JsonValue>>),
}

/// Coordinates one run over the configured streams
pub struct RunCoordinator {
    /// Run parameters, passed in explicitly
    config: TapConfig,
    /// Bookmarks, exclusively owned by this run
    store: BookmarkStore,
    /// Signposts for this run
    resolver: SignpostResolver,
    /// Checkpoint cadence
    emitter: StateEmitter,
    /// External cancellation
    cancel: CancelSignal,
    /// Per-stream lifecycle
    phases: HashMap<String, StreamPhase>,
    /// Finished streams
    outcomes: Vec<StreamOutcome>,
    /// Statistics
    stats: RunStats,
    /// Wall clock at construction
    started: Instant,
}

impl RunCoordinator {
    /// Create a coordinator for a run starting now
    pub fn new(config: TapConfig) -> Self {
        let emitter = StateEmitter::new(config.emit.clone());
        Self {
            config,
            store: BookmarkStore::new(),
            resolver: SignpostResolver::new(Utc::now()),
            emitter,
            cancel: CancelSignal::never(),
            phases: HashMap::new(),
            outcomes: Vec::new(),
            stats: RunStats::new(),
            started: Instant::now(),
        }
    }

    /// Load the prior state document handed back by the consumer
    #[must_use]
    pub fn with_prior_state(mut self, prior: StateDocument) -> Self {
        self.store.merge(prior);
        self
    }

    /// Pin the run start time (the default timestamp signpost)
    #[must_use]
    pub fn with_run_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.resolver.begin_run(at);
        self
    }

    /// Register a signpost override for a stream
    #[must_use]
    pub fn with_signpost_override<F>(mut self, stream: impl Into<String>, f: F) -> Self
    where
        F: Fn(&SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>>
            + Send
            + Sync
            + 'static,
    {
        self.resolver.set_override(stream, f);
        self
    }

    /// Observe an external cancellation signal
    #[must_use]
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run configuration
    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Bookmark store
    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> StateDocument {
        self.store.snapshot()
    }

    /// Snapshot restricted to the streams this coordinator is configured for
    pub fn owned_snapshot(&self) -> StateDocument {
        let mut document = StateDocument::new();
        for stream in &self.config.streams {
            if let Some(bookmark) = self.store.get(&stream.name) {
                document
                    .bookmarks
                    .insert(stream.name.clone(), bookmark.clone());
            }
        }
        document
    }

    /// Names of the streams this coordinator is configured for
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.config.streams.iter().map(|s| s.name.as_str())
    }

    /// Lifecycle phase of a stream
    pub fn phase(&self, stream: &str) -> StreamPhase {
        self.phases.get(stream).copied().unwrap_or_default()
    }

    /// Outcomes of streams synced so far
    pub fn outcomes(&self) -> &[StreamOutcome] {
        &self.outcomes
    }

    /// Get statistics
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Number of state messages written so far
    pub fn states_emitted(&self) -> usize {
        self.emitter.emitted_count()
    }

    /// Sync every configured stream in order, then emit the final state.
    ///
    /// Stream-scoped failures are recorded in the outcomes and the run moves
    /// on, unless `fail_fast` is set. Emission failures end the run at once.
    pub async fn run<R, S>(&mut self, source: &mut R, sink: &mut S) -> Result<StateDocument>
    where
        R: RecordSource + ?Sized,
        S: MessageSink + ?Sized,
    {
        let names: Vec<String> = self.config.streams.iter().map(|s| s.name.clone()).collect();
        let mut failure = None;

        for name in names {
            if self.cancel.is_cancelled() {
                info!("Run cancelled, skipping remaining streams");
                break;
            }

            let outcome = self.sync_stream(&name, source, sink).await?;
            if self.config.fail_fast && !outcome.is_completed() {
                failure = Some(format!(
                    "Stream '{name}' did not complete: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
                break;
            }
        }

        let document = self.finish(sink).await?;
        match failure {
            Some(message) => Err(Error::Other(message)),
            None => Ok(document),
        }
    }

    /// Emit the run-level checkpoint covering all streams
    pub async fn finish<S>(&mut self, sink: &mut S) -> Result<StateDocument>
    where
        S: MessageSink + ?Sized,
    {
        let snapshot = self.store.snapshot();
        self.emitter.emit_final(snapshot.clone(), sink).await?;
        sink.flush().await?;
        self.stats.states_emitted = self.emitter.emitted_count();

        #[allow(clippy::cast_possible_truncation)]
        self.stats
            .set_duration(self.started.elapsed().as_millis() as u64);

        info!(
            records = self.stats.records_synced,
            completed = self.stats.streams_completed,
            interrupted = self.stats.streams_interrupted,
            failed = self.stats.streams_failed,
            "Run finished"
        );
        Ok(snapshot)
    }

    /// Sync a single stream through `NOT_STARTED -> EXTRACTING -> COMPLETED |
    /// INTERRUPTED`
    pub async fn sync_stream<R, S>(
        &mut self,
        name: &str,
        source: &mut R,
        sink: &mut S,
    ) -> Result<StreamOutcome>
    where
        R: RecordSource + ?Sized,
        S: MessageSink + ?Sized,
    {
        let stream = self
            .config
            .get_stream(name)
            .cloned()
            .ok_or_else(|| Error::StreamNotFound {
                stream: name.to_string(),
            })?;

        let phase = self.phase(name);
        if phase.is_terminal() || phase == StreamPhase::Extracting {
            return Err(Error::InvalidTransition {
                stream: name.to_string(),
                from: phase.to_string(),
                to: StreamPhase::Extracting.to_string(),
            });
        }

        info!(
            stream = %name,
            method = %stream.method(),
            sorted = stream.is_sorted,
            "Beginning sync"
        );
        let mut outcome = StreamOutcome::new(name);

        // Resolve every scope before touching the store, so a resolution
        // failure leaves this stream's state exactly as it was
        let mut prepared = Vec::new();
        for scope in self.scopes_for(&stream) {
            match self.prepare(&stream, &scope) {
                Ok(tracking) => prepared.push((scope, tracking)),
                Err(e) if e.is_stream_scoped() => {
                    warn!(stream = %name, error = %e, "Stream aborted before extraction");
                    outcome.error = Some(e.to_string());
                    self.finish_stream(outcome.clone());
                    return Ok(outcome);
                }
                Err(e) => return Err(e),
            }
        }

        self.phases
            .insert(name.to_string(), StreamPhase::Extracting);
        outcome.phase = StreamPhase::Extracting;

        let mut end = ScopeEnd::Completed;
        for (scope, tracking) in prepared {
            self.begin_scope(&scope, tracking.as_ref());
            end = self
                .extract_scope(&stream, &scope, tracking, source, sink, &mut outcome)
                .await?;
            if matches!(end, ScopeEnd::Interrupted(_)) {
                break;
            }
        }

        outcome.bookmark = self
            .store
            .get(name)
            .and_then(|b| b.replication_key_value.clone());

        match end {
            ScopeEnd::Completed => {
                outcome.phase = StreamPhase::Completed;
                self.emitter.emit_final(self.store.snapshot(), sink).await?;
                info!(stream = %name, records = outcome.records, "Completed sync");
            }
            ScopeEnd::Interrupted(reason) => {
                outcome.phase = StreamPhase::Interrupted;
                outcome.error = Some(reason.to_string());
            }
        }

        self.finish_stream(outcome.clone());
        Ok(outcome)
    }

    /// Stream scope plus one scope per configured or previously seen partition
    fn scopes_for(&self, stream: &StreamConfig) -> Vec<StateScope> {
        let mut contexts = stream.partitions.clone();
        for context in self.store.partitions(&stream.name) {
            if !contexts.contains(&context) {
                contexts.push(context);
            }
        }

        if contexts.is_empty() {
            return vec![StateScope::stream(&stream.name)];
        }
        contexts
            .into_iter()
            .map(|context| StateScope::partition(&stream.name, context))
            .collect()
    }

    /// `NOT_STARTED -> EXTRACTING` preconditions: signpost, key type, and
    /// starting bookmark. Reads the store, never writes it.
    fn prepare(&mut self, stream: &StreamConfig, scope: &StateScope) -> Result<Option<Tracking>> {
        if !stream.tracks_bookmark() {
            return Ok(None);
        }

        let key = stream.key_owned().ok_or_else(|| {
            Error::signpost(
                &stream.name,
                format!("{} replication requires a replication key", stream.method()),
            )
        })?;

        let signpost = self
            .resolver
            .resolve(stream, scope, self.store.document())?;

        let key_type = stream
            .key_type
            .or_else(|| signpost.value().map(CheckpointValue::kind))
            .ok_or_else(|| {
                Error::signpost(
                    &stream.name,
                    "replication key type is undeclared and the signpost is unbounded",
                )
            })?;

        let initial = self.initial_value(stream, scope, &key, key_type)?;
        debug!(
            stream = %scope,
            initial = ?initial.as_ref().map(ToString::to_string),
            "Starting bookmark"
        );

        Ok(Some(Tracking {
            key,
            key_type,
            tracker: StreamTracker::new(stream.is_sorted, initial, signpost),
        }))
    }

    /// Prior bookmark, else configured start value, else tap start date
    fn initial_value(
        &self,
        stream: &StreamConfig,
        scope: &StateScope,
        key: &str,
        key_type: KeyType,
    ) -> Result<Option<CheckpointValue>> {
        if let Some(bookmark) = self.store.get_scoped(scope) {
            if bookmark.replication_key.as_deref() == Some(key) {
                if let Some(raw) = &bookmark.replication_key_value {
                    return CheckpointValue::parse(&stream.name, raw, key_type).map(Some);
                }
            }
        }

        if let Some(raw) = &stream.start_value {
            return CheckpointValue::parse(&stream.name, raw, key_type).map(Some);
        }

        if key_type.is_timestamp() {
            if let Some(start_date) = &self.config.start_date {
                let raw = JsonValue::String(start_date.clone());
                return CheckpointValue::parse(&stream.name, &raw, key_type).map(Some);
            }
        }

        Ok(None)
    }

    /// Record the run's signpost and starting bookmark; drop stale markers
    fn begin_scope(&mut self, scope: &StateScope, tracking: Option<&Tracking>) {
        let Some(tracking) = tracking else {
            return;
        };

        let bookmark = self.store.scoped_mut(scope);
        bookmark.reset_progress_markers();
        bookmark.set_signpost(tracking.tracker.signpost().value());
        if let Some(initial) = tracking.tracker.bookmark() {
            bookmark.commit(&tracking.key, initial);
        }
    }

    /// The `EXTRACTING` self-loop for one scope, ending in completion or
    /// interruption
    async fn extract_scope<R, S>(
        &mut self,
        stream: &StreamConfig,
        scope: &StateScope,
        mut tracking: Option<Tracking>,
        source: &mut R,
        sink: &mut S,
        outcome: &mut StreamOutcome,
    ) -> Result<ScopeEnd>
    where
        R: RecordSource + ?Sized,
        S: MessageSink + ?Sized,
    {
        let starting = tracking
            .as_ref()
            .and_then(|t| t.tracker.bookmark().cloned());

        let mut records = match source
            .records(stream, scope.partition.as_ref(), starting.as_ref())
            .await
        {
            Ok(records) => records,
            Err(e) => {
                let reason = InterruptReason::SourceFailed(e.to_string());
                return Ok(self.interrupt(scope, reason));
            }
        };

        let mut cancel = self.cancel.clone();
        loop {
            let pulled = tokio::select! {
                biased;
                () = cancel.cancelled() => Pulled::Cancelled,
                next = records.next() => Pulled::Next(next),
            };

            let record = match pulled {
                Pulled::Cancelled => {
                    return Ok(self.interrupt(scope, InterruptReason::Cancelled));
                }
                Pulled::Next(None) => break,
                Pulled::Next(Some(Err(e))) => {
                    let reason = InterruptReason::SourceFailed(e.to_string());
                    return Ok(self.interrupt(scope, reason));
                }
                Pulled::Next(Some(Ok(record))) => record,
            };

            if self.config.max_records > 0 && outcome.records >= self.config.max_records {
                let reason = InterruptReason::MaxRecords(self.config.max_records);
                return Ok(self.interrupt(scope, reason));
            }

            let key_value = tracking
                .as_ref()
                .and_then(|t| extract_key(&record, &t.key).cloned());

            // Deliver first: a clamped or out-of-order record is still data
            sink.write(&Message::record(&stream.name, record)).await?;
            outcome.records += 1;
            self.stats.records_synced += 1;

            if let Some(t) = tracking.as_mut() {
                if let Err(reason) = self.observe(scope, t, key_value) {
                    return Ok(self.interrupt(scope, reason));
                }
            }

            self.emitter.record_processed();
            if tracking.as_ref().is_some_and(|t| t.tracker.checkpointable()) {
                let store = &self.store;
                self.emitter.emit_if_due(|| store.snapshot(), sink).await?;
            }
        }

        // A cancel that raced the end of the stream still wins over complete()
        if cancel.is_cancelled() {
            return Ok(self.interrupt(scope, InterruptReason::Cancelled));
        }

        if let Some(t) = tracking.as_mut() {
            let completed = t.tracker.complete().map(|value| value.cloned());
            let final_value = match completed {
                Ok(value) => value,
                Err(e) => {
                    let reason = InterruptReason::InvalidKey(e.to_string());
                    return Ok(self.interrupt(scope, reason));
                }
            };

            let bookmark = self.store.scoped_mut(scope);
            if let Some(value) = &final_value {
                bookmark.commit(&t.key, value);
            }
            bookmark.reset_progress_markers();

            if !t.tracker.is_sorted() {
                if let (Some(max), Some(bound)) =
                    (t.tracker.observed_max(), t.tracker.signpost().value())
                {
                    if max.try_cmp(bound).is_ok_and(std::cmp::Ordering::is_gt) {
                        self.stats.clamped += 1;
                    }
                }
            }
            debug!(
                stream = %scope,
                bookmark = ?final_value.as_ref().map(ToString::to_string),
                "Committed bookmark"
            );
        }

        Ok(ScopeEnd::Completed)
    }

    /// Feed one key value to the tracker and mirror sorted advances into the
    /// store
    fn observe(
        &mut self,
        scope: &StateScope,
        tracking: &mut Tracking,
        raw: Option<JsonValue>,
    ) -> std::result::Result<(), InterruptReason> {
        let Some(raw) = raw.filter(|v| !v.is_null()) else {
            self.stats.keys_missing += 1;
            warn!(stream = %scope, key = %tracking.key, "Record has no replication key value; skipped for bookmark");
            return Ok(());
        };

        let value = CheckpointValue::parse(&scope.stream, &raw, tracking.key_type)
            .map_err(|e| InterruptReason::InvalidKey(e.to_string()))?;

        let observation = tracking
            .tracker
            .observe(value.clone())
            .map_err(|e| InterruptReason::InvalidKey(e.to_string()))?;

        match observation {
            Observation::Advanced | Observation::Clamped => {
                if observation == Observation::Clamped {
                    self.stats.clamped += 1;
                    debug!(stream = %scope, value = %raw, "Value beyond signpost, bookmark capped");
                }
                if let Some(bookmark) = tracking.tracker.bookmark() {
                    self.store.scoped_mut(scope).commit(&tracking.key, bookmark);
                }
            }
            Observation::OutOfOrder => {
                self.stats.out_of_order += 1;
                warn!(
                    stream = %scope,
                    value = %raw,
                    bookmark = ?tracking.tracker.bookmark().map(ToString::to_string),
                    "Sorted stream emitted a value below its bookmark; ignored for progress"
                );
            }
            Observation::Deferred => {
                // Expose a new running maximum as a non-resumable marker
                if tracking.tracker.observed_max() == Some(&value) {
                    self.store
                        .scoped_mut(scope)
                        .write_progress_marker(&tracking.key, &value);
                }
            }
            Observation::Unchanged => {}
        }
        Ok(())
    }

    /// `EXTRACTING -> INTERRUPTED`: no complete(), the store keeps its last
    /// safe bookmark and any progress markers stay as written.
    fn interrupt(&self, scope: &StateScope, reason: InterruptReason) -> ScopeEnd {
        warn!(stream = %scope, reason = %reason, "Stream interrupted; bookmark left at last safe value");
        ScopeEnd::Interrupted(reason)
    }

    fn finish_stream(&mut self, outcome: StreamOutcome) {
        self.phases.insert(outcome.stream.clone(), outcome.phase);
        self.stats.add_outcome(&outcome);
        self.outcomes.push(outcome);
    }
}

/// Look up a replication key, supporting dot notation for nested fields
fn extract_key<'a>(record: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}
