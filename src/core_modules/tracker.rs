// THEORY:
// The `tracker` module is the memory of the Behavioral Analysis Layer. It holds the
// set of centroids currently being watched for a line crossing, and it is the only
// state (besides the background model) that survives from one frame to the next.
//
// This module frames the "data association problem" without committing to one
// answer for it.
//
// Key architectural principles:
// 1.  **Position Only**: A `TrackedCentroid` is a point plus the frame it was last
//     observed in. It has no identity, size or velocity. The frame stamp exists so
//     stale points can be evicted.
// 2.  **Pluggable Association**: How a new detection is folded into the set is
//     decided by an `AssociationStrategy`.
//     - `EveryDetection` appends a fresh point for every detection of every frame.
//       Nothing is matched across frames. This is the reference counting behavior:
//       accuracy relies on vehicles passing the line cleanly.
//     - `NearestCentroid` moves the closest existing point within a distance gate
//       instead, so one vehicle is represented by one point while it approaches.
// 3.  **Bounded Growth**: Points that were never retired and not re-observed for
//     `max_age` frames are dropped. Under `EveryDetection` a point never moves, so
//     a point that has not crossed yet never will, and eviction cannot change which
//     crossings are reported.
// 4.  **Two-Phase Removal**: Retiring points is done by index sets computed from a
//     stable snapshot (see `line_crossing`), never while iterating the live set.

use crate::core_modules::blob::Point;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::trace;

/// A point under watch for a line crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedCentroid {
    pub position: Point,
    /// Index of the frame in which this point was last placed or moved.
    pub last_seen_frame: u64,
}

/// Decides how one detection enters the tracked set.
pub trait AssociationStrategy: Send {
    /// Folds `detection` into `tracked` and returns the index of the entry that now
    /// represents it.
    fn associate(
        &mut self,
        tracked: &mut Vec<TrackedCentroid>,
        detection: Point,
        frame_index: u64,
    ) -> usize;

    fn name(&self) -> &'static str;
}

/// Appends every detection as a new point. No cross-frame matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct EveryDetection;

impl AssociationStrategy for EveryDetection {
    fn associate(
        &mut self,
        tracked: &mut Vec<TrackedCentroid>,
        detection: Point,
        frame_index: u64,
    ) -> usize {
        tracked.push(TrackedCentroid {
            position: detection,
            last_seen_frame: frame_index,
        });
        tracked.len() - 1
    }

    fn name(&self) -> &'static str {
        "every-detection"
    }
}

/// Moves the nearest point within `max_distance` that has not already been placed
/// or moved in the current frame. Appends a new point when none qualifies.
#[derive(Debug, Clone, Copy)]
pub struct NearestCentroid {
    max_distance: f64,
}

impl NearestCentroid {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }
}

impl AssociationStrategy for NearestCentroid {
    fn associate(
        &mut self,
        tracked: &mut Vec<TrackedCentroid>,
        detection: Point,
        frame_index: u64,
    ) -> usize {
        let mut best_match_index = None;
        let mut best_match_dist = self.max_distance;
        for (i, centroid) in tracked.iter().enumerate() {
            // Already claimed by another detection of this frame.
            if centroid.last_seen_frame == frame_index {
                continue;
            }
            let dist = centroid.position.distance_to(&detection);
            if dist <= best_match_dist {
                best_match_dist = dist;
                best_match_index = Some(i);
            }
        }

        let updated = TrackedCentroid {
            position: detection,
            last_seen_frame: frame_index,
        };
        match best_match_index {
            Some(i) => {
                tracked[i] = updated;
                i
            }
            None => {
                tracked.push(updated);
                tracked.len() - 1
            }
        }
    }

    fn name(&self) -> &'static str {
        "nearest-centroid"
    }
}

/// Selects the association strategy from configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AssociationMode {
    #[default]
    EveryDetection,
    NearestCentroid { max_distance: f64 },
}

impl AssociationMode {
    pub fn build(&self) -> Box<dyn AssociationStrategy> {
        match self {
            AssociationMode::EveryDetection => Box::new(EveryDetection),
            AssociationMode::NearestCentroid { max_distance } => {
                Box::new(NearestCentroid::new(*max_distance))
            }
        }
    }
}

/// Owns the tracked set and the strategy that feeds it.
pub struct CentroidTracker {
    centroids: Vec<TrackedCentroid>,
    strategy: Box<dyn AssociationStrategy>,
    /// Frames a point may go unobserved before eviction. `None` keeps points forever.
    max_age: Option<u64>,
}

impl CentroidTracker {
    pub fn new(strategy: Box<dyn AssociationStrategy>, max_age: Option<u64>) -> Self {
        Self {
            centroids: Vec::new(),
            strategy,
            max_age,
        }
    }

    /// Folds one detection into the tracked set.
    pub fn observe(&mut self, detection: Point, frame_index: u64) -> usize {
        self.strategy
            .associate(&mut self.centroids, detection, frame_index)
    }

    /// Removes the entries at the given indices. Indices refer to the set as it was
    /// when they were computed; out-of-range or repeated indices are ignored.
    pub fn remove_indices(&mut self, indices: &HashSet<usize>) -> Vec<TrackedCentroid> {
        let mut removed = Vec::with_capacity(indices.len());
        let mut kept = Vec::with_capacity(self.centroids.len());
        for (i, centroid) in self.centroids.drain(..).enumerate() {
            if indices.contains(&i) {
                removed.push(centroid);
            } else {
                kept.push(centroid);
            }
        }
        self.centroids = kept;
        removed
    }

    /// Drops points not observed within `max_age` frames of `current_frame`.
    pub fn evict_stale(&mut self, current_frame: u64) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let before = self.centroids.len();
        self.centroids
            .retain(|c| current_frame.saturating_sub(c.last_seen_frame) <= max_age);
        let evicted = before - self.centroids.len();
        if evicted > 0 {
            trace!(evicted, remaining = self.centroids.len(), "evicted stale centroids");
        }
        evicted
    }

    pub fn centroids(&self) -> &[TrackedCentroid] {
        &self.centroids
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}
