//! Signpost resolution
//!
//! A signpost is the run-scoped upper bound a bookmark may never exceed.
//! It is resolved once per stream (or partition) per run and cached, so
//! repeated resolution within a run always yields the same value.
//!
//! Resolution order:
//! 1. a programmatic [`SignpostOverride`] registered for the stream
//! 2. a literal `signpost` in the stream config
//! 3. the run start time, for timestamp keys
//! 4. no bound, for other declared key types
//!
//! A stream whose key type is undeclared and which has no override cannot be
//! resolved and fails before extraction starts.

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::state::{StateDocument, StateScope};
use crate::value::CheckpointValue;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Upper bound for a stream's bookmark during one run
#[derive(Debug, Clone, PartialEq)]
pub enum Signpost {
    /// Bookmarks are capped at this value
    Bounded(CheckpointValue),
    /// No advance-time bound; the final observed value stands
    Unbounded,
}

impl Signpost {
    /// The bound, if any
    pub fn value(&self) -> Option<&CheckpointValue> {
        match self {
            Self::Bounded(value) => Some(value),
            Self::Unbounded => None,
        }
    }

    /// Cap a value at the signpost. Returns the capped value and whether it
    /// was reduced.
    pub fn clamp(&self, value: CheckpointValue) -> Result<(CheckpointValue, bool)> {
        match self {
            Self::Unbounded => Ok((value, false)),
            Self::Bounded(bound) => match value.try_cmp(bound)? {
                Ordering::Greater => Ok((bound.clone(), true)),
                _ => Ok((value, false)),
            },
        }
    }
}

/// Inputs available to a signpost override
#[derive(Debug)]
pub struct SignpostRequest<'a> {
    /// Stream being resolved
    pub stream: &'a StreamConfig,
    /// Stream or partition scope
    pub scope: &'a StateScope,
    /// Committed bookmark from prior state, if any
    pub prior: Option<CheckpointValue>,
    /// Wall-clock time the run started
    pub run_started_at: DateTime<Utc>,
}

/// Connector-supplied signpost function.
///
/// Returning `Ok(None)` means the stream has no upper bound for this run.
pub trait SignpostOverride: Send + Sync {
    /// Compute the signpost for a stream
    fn signpost(&self, request: &SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>>;
}

impl<F> SignpostOverride for F
where
    F: Fn(&SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>> + Send + Sync,
{
    fn signpost(&self, request: &SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>> {
        self(request)
    }
}

/// Resolves and caches signposts for one run
#[derive(Clone)]
pub struct SignpostResolver {
    run_started_at: DateTime<Utc>,
    overrides: HashMap<String, Arc<dyn SignpostOverride>>,
    resolved: HashMap<String, Signpost>,
}

impl std::fmt::Debug for SignpostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignpostResolver")
            .field("run_started_at", &self.run_started_at)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl SignpostResolver {
    /// Create a resolver for a run that started at the given time
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self {
            run_started_at,
            overrides: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Register an override closure for a stream
    pub fn set_override<F>(&mut self, stream: impl Into<String>, f: F)
    where
        F: Fn(&SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>>
            + Send
            + Sync
            + 'static,
    {
        self.set_override_impl(stream, Arc::new(f));
    }

    /// Register a shared override implementation for a stream
    pub fn set_override_impl(&mut self, stream: impl Into<String>, f: Arc<dyn SignpostOverride>) {
        self.overrides.insert(stream.into(), f);
    }

    /// Register an override closure (builder form)
    #[must_use]
    pub fn with_override<F>(mut self, stream: impl Into<String>, f: F) -> Self
    where
        F: Fn(&SignpostRequest<'_>) -> anyhow::Result<Option<CheckpointValue>>
            + Send
            + Sync
            + 'static,
    {
        self.set_override(stream, f);
        self
    }

    /// Time the run started
    pub fn run_started_at(&self) -> DateTime<Utc> {
        self.run_started_at
    }

    /// Start a new run: set the start time and forget cached signposts.
    /// Overrides stay registered.
    pub fn begin_run(&mut self, run_started_at: DateTime<Utc>) {
        self.run_started_at = run_started_at;
        self.resolved.clear();
    }

    /// Resolve the signpost for a scope, reading prior state but never
    /// modifying it
    pub fn resolve(
        &mut self,
        stream: &StreamConfig,
        scope: &StateScope,
        prior_state: &StateDocument,
    ) -> Result<Signpost> {
        let cache_key = scope.to_string();
        if let Some(signpost) = self.resolved.get(&cache_key) {
            return Ok(signpost.clone());
        }

        let signpost = self.compute(stream, scope, prior_state)?;
        debug!(stream = %scope, signpost = ?signpost.value().map(ToString::to_string), "Resolved signpost");
        self.resolved.insert(cache_key, signpost.clone());
        Ok(signpost)
    }

    fn compute(
        &self,
        stream: &StreamConfig,
        scope: &StateScope,
        prior_state: &StateDocument,
    ) -> Result<Signpost> {
        if let Some(f) = self.overrides.get(&stream.name) {
            let prior = match (stream.key(), stream.key_type) {
                (Some(key), Some(key_type)) => prior_state
                    .get(scope)
                    .and_then(|b| b.value_for(key, key_type)),
                _ => None,
            };
            let request = SignpostRequest {
                stream,
                scope,
                prior,
                run_started_at: self.run_started_at,
            };
            let value = f
                .signpost(&request)
                .map_err(|e| Error::signpost(&stream.name, e.to_string()))?;
            return match value {
                None => Ok(Signpost::Unbounded),
                Some(value) => {
                    if let Some(key_type) = stream.key_type {
                        if value.kind() != key_type {
                            return Err(Error::signpost(
                                &stream.name,
                                format!("override returned a {} for a {key_type} key", value.kind()),
                            ));
                        }
                    }
                    Ok(Signpost::Bounded(value))
                }
            };
        }

        let Some(key_type) = stream.key_type else {
            return Err(Error::signpost(
                &stream.name,
                "replication key type is undeclared and no signpost override was supplied",
            ));
        };

        if let Some(raw) = &stream.signpost {
            let value = CheckpointValue::from_json(raw, key_type).ok_or_else(|| {
                Error::signpost(&stream.name, format!("signpost {raw} is not a valid {key_type}"))
            })?;
            return Ok(Signpost::Bounded(value));
        }

        if key_type.is_timestamp() {
            return Ok(Signpost::Bounded(CheckpointValue::Timestamp(
                self.run_started_at,
            )));
        }

        Ok(Signpost::Unbounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyType;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    fn run_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_timestamp_defaults_to_run_start() {
        let mut resolver = SignpostResolver::new(run_start());
        let stream = StreamConfig::incremental("events", "updated_at", KeyType::Timestamp);

        let signpost = resolver
            .resolve(&stream, &StateScope::stream("events"), &StateDocument::new())
            .unwrap();
        assert_eq!(signpost, Signpost::Bounded(CheckpointValue::Timestamp(run_start())));
    }

    #[test]
    fn test_non_timestamp_without_override_is_unbounded() {
        let mut resolver = SignpostResolver::new(run_start());
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);

        let signpost = resolver
            .resolve(&stream, &StateScope::stream("orders"), &StateDocument::new())
            .unwrap();
        assert_eq!(signpost, Signpost::Unbounded);
    }

    #[test]
    fn test_static_signpost_from_config() {
        let mut resolver = SignpostResolver::new(run_start());
        let stream =
            StreamConfig::incremental("orders", "id", KeyType::Integer).with_signpost(json!(180));

        let signpost = resolver
            .resolve(&stream, &StateScope::stream("orders"), &StateDocument::new())
            .unwrap();
        assert_eq!(signpost, Signpost::Bounded(CheckpointValue::Integer(180)));
    }

    #[test]
    fn test_override_receives_prior_bookmark() {
        let mut prior = StateDocument::new();
        prior
            .get_mut(&StateScope::stream("orders"))
            .commit("id", &CheckpointValue::Integer(100));

        let mut resolver = SignpostResolver::new(run_start()).with_override(
            "orders",
            |req| {
                let CheckpointValue::Integer(prior) = req.prior.clone().unwrap() else {
                    anyhow::bail!("unexpected prior");
                };
                Ok(Some(CheckpointValue::Integer(prior + 80)))
            },
        );
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);

        let signpost = resolver
            .resolve(&stream, &StateScope::stream("orders"), &prior)
            .unwrap();
        assert_eq!(signpost, Signpost::Bounded(CheckpointValue::Integer(180)));
    }

    #[test]
    fn test_override_may_lift_the_bound() {
        let mut resolver = SignpostResolver::new(run_start())
            .with_override("events", |_| Ok(None));
        let stream = StreamConfig::incremental("events", "updated_at", KeyType::Timestamp);

        let signpost = resolver
            .resolve(&stream, &StateScope::stream("events"), &StateDocument::new())
            .unwrap();
        assert_eq!(signpost, Signpost::Unbounded);
    }

    /// Override backed by a fixed watermark
    struct Watermark(i64);

    impl SignpostOverride for Watermark {
        fn signpost(
            &self,
            _request: &SignpostRequest<'_>,
        ) -> anyhow::Result<Option<CheckpointValue>> {
            Ok(Some(CheckpointValue::Integer(self.0)))
        }
    }

    #[test]
    fn test_shared_override_impl() {
        let watermark: Arc<dyn SignpostOverride> = Arc::new(Watermark(250));
        let mut resolver = SignpostResolver::new(run_start());
        resolver.set_override_impl("orders", Arc::clone(&watermark));
        resolver.set_override_impl("refunds", watermark);

        for name in ["orders", "refunds"] {
            let stream = StreamConfig::incremental(name, "id", KeyType::Integer);
            let signpost = resolver
                .resolve(&stream, &StateScope::stream(name), &StateDocument::new())
                .unwrap();
            assert_eq!(signpost, Signpost::Bounded(CheckpointValue::Integer(250)));
        }
    }

    #[test]
    fn test_resolution_is_cached_per_run() {
        let calls = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&calls);
        let mut resolver = SignpostResolver::new(run_start()).with_override(
            "orders",
            move |_| {
                let n = counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(Some(CheckpointValue::Integer(1000 + n)))
            },
        );
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);
        let scope = StateScope::stream("orders");

        let first = resolver.resolve(&stream, &scope, &StateDocument::new()).unwrap();
        let second = resolver.resolve(&stream, &scope, &StateDocument::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_partitions_resolve_independently() {
        let mut resolver = SignpostResolver::new(run_start());
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer)
            .with_signpost(json!(5));
        let eu = StateScope::partition("orders", json!({"r": "eu"}).as_object().unwrap().clone());
        let us = StateScope::partition("orders", json!({"r": "us"}).as_object().unwrap().clone());

        resolver.resolve(&stream, &eu, &StateDocument::new()).unwrap();
        resolver.resolve(&stream, &us, &StateDocument::new()).unwrap();
        assert_eq!(resolver.resolved.len(), 2);
    }

    #[test]
    fn test_undeclared_key_type_fails() {
        let mut resolver = SignpostResolver::new(run_start());
        let mut stream = StreamConfig::incremental("orders", "id", KeyType::Integer);
        stream.key_type = None;

        let err = resolver
            .resolve(&stream, &StateScope::stream("orders"), &StateDocument::new())
            .unwrap_err();
        assert!(matches!(err, Error::SignpostResolution { .. }));
        assert!(err.is_stream_scoped());
    }

    #[test]
    fn test_override_error_fails() {
        let mut resolver = SignpostResolver::new(run_start()).with_override(
            "orders",
            |_| anyhow::bail!("upstream max id query failed"),
        );
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);

        let err = resolver
            .resolve(&stream, &StateScope::stream("orders"), &StateDocument::new())
            .unwrap_err();
        assert!(err.to_string().contains("upstream max id query failed"));
    }

    #[test]
    fn test_override_wrong_kind_fails() {
        let mut resolver = SignpostResolver::new(run_start()).with_override(
            "orders",
            |_| Ok(Some(CheckpointValue::Token("zzz".into()))),
        );
        let stream = StreamConfig::incremental("orders", "id", KeyType::Integer);

        assert!(resolver
            .resolve(&stream, &StateScope::stream("orders"), &StateDocument::new())
            .is_err());
    }

    #[test]
    fn test_clamp() {
        let signpost = Signpost::Bounded(CheckpointValue::Integer(180));
        assert_eq!(
            signpost.clamp(CheckpointValue::Integer(200)).unwrap(),
            (CheckpointValue::Integer(180), true)
        );
        assert_eq!(
            signpost.clamp(CheckpointValue::Integer(150)).unwrap(),
            (CheckpointValue::Integer(150), false)
        );
        assert_eq!(
            Signpost::Unbounded.clamp(CheckpointValue::Integer(999)).unwrap(),
            (CheckpointValue::Integer(999), false)
        );
    }
}
