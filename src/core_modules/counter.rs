// THEORY:
// The `VehicleCounter` is the top of the Behavioral Analysis Layer. It owns the
// long-lived counting state (the tracked centroid set and the running vehicle
// count) and turns each frame's blob list into crossing events.
//
// For every blob, in detection order:
// 1.  fold the blob's centroid into the tracker,
// 2.  retire every tracked point now inside the crossing band,
// 3.  emit one `CrossingEvent` per retired point, incrementing the count first and
//     taking speed and region from the blob whose detection triggered the scan.
// After the last blob, points that have gone unobserved too long are evicted.
//
// Invariant: the count starts at zero, only ever increases, and increases by
// exactly one per emitted event. Events of one frame carry consecutive counts.

use crate::core_modules::blob::{Blob, BoundingBox, Point};
use crate::core_modules::line_crossing::{DetectionLine, LineCrossingDetector};
use crate::core_modules::speed::speed_estimator::SpeedEstimator;
use crate::core_modules::tracker::{AssociationStrategy, CentroidTracker, TrackedCentroid};
use chrono::{DateTime, Local};
use tracing::debug;

/// Timestamp layout used for logs, CSV rows and snapshot names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One vehicle passing the detection line.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    /// Running vehicle count including this event. Starts at 1.
    pub count: u64,
    /// Proxy speed, rounded to two decimals.
    pub speed: f64,
    pub timestamp: DateTime<Local>,
    /// Index of the frame the crossing was detected in.
    pub frame_index: u64,
    /// Bounding box of the triggering blob, for snapshot extraction.
    pub region: BoundingBox,
    /// The tracked point that was retired.
    pub centroid: Point,
}

impl CrossingEvent {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Owns the tracker, the line test and the running count.
pub struct VehicleCounter {
    tracker: CentroidTracker,
    detector: LineCrossingDetector,
    estimator: SpeedEstimator,
    vehicle_count: u64,
}

impl VehicleCounter {
    pub fn new(
        line: DetectionLine,
        estimator: SpeedEstimator,
        strategy: Box<dyn AssociationStrategy>,
        max_centroid_age: Option<u64>,
    ) -> Self {
        Self {
            tracker: CentroidTracker::new(strategy, max_centroid_age),
            detector: LineCrossingDetector::new(line),
            estimator,
            vehicle_count: 0,
        }
    }

    /// Folds one frame's size-filtered blobs into the tracker and returns the
    /// crossings they produced, in emission order. Events are stamped with the
    /// frame's capture time.
    pub fn update(
        &mut self,
        blobs: &[Blob],
        frame_index: u64,
        captured_at: DateTime<Local>,
    ) -> Vec<CrossingEvent> {
        let mut events = Vec::new();

        for blob in blobs {
            self.tracker.observe(blob.centroid(), frame_index);

            for retired in self.detector.retire_crossings(&mut self.tracker) {
                events.push(self.record_crossing(blob, retired, frame_index, captured_at));
            }
        }

        self.tracker.evict_stale(frame_index);
        events
    }

    fn record_crossing(
        &mut self,
        blob: &Blob,
        retired: TrackedCentroid,
        frame_index: u64,
        captured_at: DateTime<Local>,
    ) -> CrossingEvent {
        self.vehicle_count += 1;
        let event = CrossingEvent {
            count: self.vehicle_count,
            speed: self.estimator.estimate(blob.width()),
            timestamp: captured_at,
            frame_index,
            region: blob.bounding_box,
            centroid: retired.position,
        };
        debug!(
            count = event.count,
            speed = event.speed,
            frame = frame_index,
            "line crossing"
        );
        event
    }

    pub fn vehicle_count(&self) -> u64 {
        self.vehicle_count
    }

    pub fn tracked_centroids(&self) -> &[TrackedCentroid] {
        self.tracker.centroids()
    }

    pub fn line(&self) -> DetectionLine {
        self.detector.line()
    }
}
