//! Unsorted-stream bookmark policy

use super::{BookmarkTracker, Observation};
use crate::error::{Error, Result};
use crate::signpost::Signpost;
use crate::value::CheckpointValue;
use std::cmp::Ordering;

/// Tracker for streams that may emit keys in any order.
///
/// A lower key may still be pending until the pass finishes, so the bookmark
/// stays at its starting value for the whole run. `complete()` is the only
/// point where it moves, to `min(running maximum, signpost)`.
#[derive(Debug, Clone)]
pub struct UnsortedTracker {
    bookmark: Option<CheckpointValue>,
    running_max: Option<CheckpointValue>,
    signpost: Signpost,
    completed: bool,
}

impl UnsortedTracker {
    /// Create a tracker frozen at `initial`
    pub fn new(initial: Option<CheckpointValue>, signpost: Signpost) -> Self {
        Self {
            bookmark: initial,
            running_max: None,
            signpost,
            completed: false,
        }
    }

    fn final_bookmark(&self) -> Result<Option<CheckpointValue>> {
        let Some(max) = self.running_max.clone() else {
            return Ok(self.bookmark.clone());
        };
        let (capped, _) = self.signpost.clamp(max)?;
        match &self.bookmark {
            Some(current) if capped.try_cmp(current)? != Ordering::Greater => {
                Ok(Some(current.clone()))
            }
            _ => Ok(Some(capped)),
        }
    }
}

impl BookmarkTracker for UnsortedTracker {
    fn observe(&mut self, value: CheckpointValue) -> Result<Observation> {
        if self.completed {
            return Err(Error::state("observe called after complete"));
        }

        let raises = match &self.running_max {
            None => true,
            Some(max) => value.try_cmp(max)? == Ordering::Greater,
        };
        if raises {
            self.running_max = Some(value);
        }
        Ok(Observation::Deferred)
    }

    fn checkpointable(&self) -> bool {
        self.completed
    }

    fn complete(&mut self) -> Result<Option<&CheckpointValue>> {
        if !self.completed {
            // Compute fully before assigning so a failure leaves the
            // tracker exactly as it was
            let next = self.final_bookmark()?;
            self.bookmark = next;
            self.completed = true;
        }
        Ok(self.bookmark.as_ref())
    }

    fn bookmark(&self) -> Option<&CheckpointValue> {
        self.bookmark.as_ref()
    }

    fn observed_max(&self) -> Option<&CheckpointValue> {
        self.running_max.as_ref()
    }

    fn signpost(&self) -> &Signpost {
        &self.signpost
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}
