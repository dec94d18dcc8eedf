//! Sorted-stream bookmark policy

use super::{BookmarkTracker, Observation};
use crate::error::{Error, Result};
use crate::signpost::Signpost;
use crate::value::CheckpointValue;
use std::cmp::Ordering;

/// Tracker for streams whose source emits keys in non-decreasing order.
///
/// Every advance is individually safe to persist, so an interrupted run keeps
/// whatever progress it made.
#[derive(Debug, Clone)]
pub struct SortedTracker {
    bookmark: Option<CheckpointValue>,
    observed_max: Option<CheckpointValue>,
    signpost: Signpost,
    completed: bool,
}

impl SortedTracker {
    /// Create a tracker starting from `initial`
    pub fn new(initial: Option<CheckpointValue>, signpost: Signpost) -> Self {
        Self {
            observed_max: initial.clone(),
            bookmark: initial,
            signpost,
            completed: false,
        }
    }
}

impl BookmarkTracker for SortedTracker {
    fn observe(&mut self, value: CheckpointValue) -> Result<Observation> {
        if self.completed {
            return Err(Error::state("observe called after complete"));
        }

        if let Some(current) = &self.observed_max {
            if value.try_cmp(current)? == Ordering::Less {
                return Ok(Observation::OutOfOrder);
            }
        }
        self.observed_max = Some(value.clone());

        let (capped, clamped) = self.signpost.clamp(value)?;
        let advances = match &self.bookmark {
            None => true,
            Some(current) => capped.try_cmp(current)? == Ordering::Greater,
        };
        if !advances {
            return Ok(Observation::Unchanged);
        }

        self.bookmark = Some(capped);
        Ok(if clamped {
            Observation::Clamped
        } else {
            Observation::Advanced
        })
    }

    fn checkpointable(&self) -> bool {
        true
    }

    fn complete(&mut self) -> Result<Option<&CheckpointValue>> {
        // Every advance was capped on the way in, so no final clamp. A prior
        // bookmark above the signpost is kept as is: bookmarks never regress.
        self.completed = true;
        Ok(self.bookmark.as_ref())
    }

    fn bookmark(&self) -> Option<&CheckpointValue> {
        self.bookmark.as_ref()
    }

    fn observed_max(&self) -> Option<&CheckpointValue> {
        self.observed_max.as_ref()
    }

    fn signpost(&self) -> &Signpost {
        &self.signpost
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}
