//! Bookmark tracking module
//!
//! Turns the sequence of observed replication key values into the bookmark
//! that is safe to persist at any moment.
//!
//! # Overview
//!
//! The tracker module provides:
//! - `BookmarkTracker` - Shared capability: observe, checkpointable, complete
//! - `SortedTracker` - Advances record by record, every advance checkpointable
//! - `UnsortedTracker` - Frozen at the starting bookmark until `complete()`
//! - `StreamTracker` - Tagged variant chosen from the stream's sortedness flag
//!
//! Both policies cap the bookmark at the run's signpost and never move a
//! bookmark below the value it started from.

mod sorted;
mod unsorted;

pub use sorted::SortedTracker;
pub use unsorted::UnsortedTracker;

use crate::error::Result;
use crate::signpost::Signpost;
use crate::value::CheckpointValue;

/// Effect of one observed value on the bookmark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Bookmark advanced to the observed value
    Advanced,
    /// Bookmark advanced, but only as far as the signpost
    Clamped,
    /// No change (tie, or already at the signpost)
    Unchanged,
    /// Value is below the sorted bookmark; ignored for progress
    OutOfOrder,
    /// Recorded in the running maximum, bookmark frozen until completion
    Deferred,
}

/// Shared capability of the sorted and unsorted policies
pub trait BookmarkTracker {
    /// Record a value seen in the emitted record sequence
    fn observe(&mut self, value: CheckpointValue) -> Result<Observation>;

    /// Whether `bookmark()` may be persisted right now
    fn checkpointable(&self) -> bool;

    /// Finish a successful, uninterrupted pass and return the final bookmark
    fn complete(&mut self) -> Result<Option<&CheckpointValue>>;

    /// Externally visible bookmark
    fn bookmark(&self) -> Option<&CheckpointValue>;

    /// Highest value observed so far, including values not yet committed
    fn observed_max(&self) -> Option<&CheckpointValue>;

    /// Signpost this tracker enforces
    fn signpost(&self) -> &Signpost;

    /// Whether `complete()` has been applied
    fn is_completed(&self) -> bool;
}

/// Per-stream tracker, tagged by sortedness
#[derive(Debug, Clone)]
pub enum StreamTracker {
    /// Source guarantees non-decreasing key order
    Sorted(SortedTracker),
    /// Source may emit keys in any order
    Unsorted(UnsortedTracker),
}

impl StreamTracker {
    /// Build the tracker matching a stream's sortedness flag
    pub fn new(is_sorted: bool, initial: Option<CheckpointValue>, signpost: Signpost) -> Self {
        if is_sorted {
            Self::Sorted(SortedTracker::new(initial, signpost))
        } else {
            Self::Unsorted(UnsortedTracker::new(initial, signpost))
        }
    }

    /// Whether this is the sorted policy
    pub fn is_sorted(&self) -> bool {
        matches!(self, Self::Sorted(_))
    }

    fn inner(&self) -> &dyn BookmarkTracker {
        match self {
            Self::Sorted(t) => t,
            Self::Unsorted(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BookmarkTracker {
        match self {
            Self::Sorted(t) => t,
            Self::Unsorted(t) => t,
        }
    }
}

impl BookmarkTracker for StreamTracker {
    fn observe(&mut self, value: CheckpointValue) -> Result<Observation> {
        self.inner_mut().observe(value)
    }

    fn checkpointable(&self) -> bool {
        self.inner().checkpointable()
    }

    fn complete(&mut self) -> Result<Option<&CheckpointValue>> {
        self.inner_mut().complete()
    }

    fn bookmark(&self) -> Option<&CheckpointValue> {
        self.inner().bookmark()
    }

    fn observed_max(&self) -> Option<&CheckpointValue> {
        self.inner().observed_max()
    }

    fn signpost(&self) -> &Signpost {
        self.inner().signpost()
    }

    fn is_completed(&self) -> bool {
        self.inner().is_completed()
    }
}
