// THEORY:
// The `line_crossing` module decides when a tracked point counts as a vehicle
// passing the detection line.
//
// A point "crosses" when its row lies strictly inside the tolerance band around
// the line: `position - offset < y < position + offset`. The band edges themselves
// do not trigger. Every point that triggers is retired at once, so it can never
// trigger a second time.
//
// Retirement happens in two phases. First the tracked set is scanned as a stable
// snapshot and the indices of every point inside the band are collected. Only then
// are exactly those indices removed from the live set. The scan therefore never
// skips or revisits an entry because of its own removals.

use crate::core_modules::tracker::{CentroidTracker, TrackedCentroid};
use serde::Deserialize;
use std::collections::HashSet;

/// A horizontal pixel row with a tolerance band on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetectionLine {
    /// The image row the line is drawn on.
    pub position: u32,
    /// Half-width of the band, in rows. The band excludes its edges.
    pub offset: u32,
}

impl Default for DetectionLine {
    fn default() -> Self {
        Self {
            position: 550,
            offset: 6,
        }
    }
}

impl DetectionLine {
    pub fn new(position: u32, offset: u32) -> Self {
        Self { position, offset }
    }

    /// True when `y` lies strictly inside the band.
    pub fn contains(&self, y: u32) -> bool {
        let y = y as i64;
        let position = self.position as i64;
        let offset = self.offset as i64;
        position - offset < y && y < position + offset
    }
}

/// Retires tracked points that have reached the detection line.
#[derive(Debug, Clone, Copy)]
pub struct LineCrossingDetector {
    line: DetectionLine,
}

impl LineCrossingDetector {
    pub fn new(line: DetectionLine) -> Self {
        Self { line }
    }

    pub fn line(&self) -> DetectionLine {
        self.line
    }

    /// Removes and returns every tracked point inside the band, in tracked-set order.
    pub fn retire_crossings(&self, tracker: &mut CentroidTracker) -> Vec<TrackedCentroid> {
        // --- Phase 1: find matches on a stable snapshot ---
        let crossing: HashSet<usize> = tracker
            .centroids()
            .iter()
            .enumerate()
            .filter(|(_, c)| self.line.contains(c.position.y))
            .map(|(i, _)| i)
            .collect();

        if crossing.is_empty() {
            return Vec::new();
        }

        // --- Phase 2: remove exactly those entries ---
        tracker.remove_indices(&crossing)
    }
}
