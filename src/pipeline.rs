// THEORY:
// The `pipeline` module is the single-frame API of the counter. It wires the
// spatial layer (mask building and blob extraction) to the behavioral layer
// (tracking and line crossing) and hands back one `FrameReport` per frame.
//
// It does not know where frames come from or where events go. The orchestrator
// owns that loop; embedding applications can also drive `CountingPipeline`
// directly, one frame at a time.

use crate::core_modules::background_model::BackgroundModelConfig;
use crate::core_modules::blob::{Blob, Point};
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::counter::VehicleCounter;
use crate::core_modules::frame::{Frame, MotionMask};
use crate::core_modules::frame_processor::{FrameProcessor, MorphologyConfig};
use crate::core_modules::line_crossing::DetectionLine;
use crate::core_modules::speed::speed_estimator::SpeedEstimator;
use crate::core_modules::tracker::AssociationMode;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::trace;

// Re-export key data structures for the public API.
pub use crate::core_modules::counter::CrossingEvent;
pub use crate::core_modules::tracker::TrackedCentroid;

/// Blob size gate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_width: 80,
            min_height: 80,
        }
    }
}

/// How detections are folded into the tracked set and how long unretired points live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub association: AssociationMode,
    /// Frames an unretired point may go unobserved. `None` or `0` keeps every
    /// point forever.
    pub max_centroid_age: Option<u64>,
}

impl TrackingConfig {
    /// The eviction age handed to the tracker, with `0` read as disabled.
    pub fn eviction_age(&self) -> Option<u64> {
        self.max_centroid_age.filter(|&age| age > 0)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            association: AssociationMode::EveryDetection,
            max_centroid_age: Some(150),
        }
    }
}

/// Rate limiting between frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Target frames per second. 0 disables the delay.
    pub frames_per_second: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 60,
        }
    }
}

impl PacingConfig {
    pub fn frame_delay(&self) -> Option<Duration> {
        match self.frames_per_second {
            0 => None,
            fps => Some(Duration::from_secs_f64(1.0 / fps as f64)),
        }
    }
}

/// Configuration for the counting pipeline. `Default` reproduces the reference
/// constants: 80x80 size gate, line at row 550 with a ±6 band, 60 fps pacing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub line: DetectionLine,
    pub speed: SpeedEstimator,
    pub background: BackgroundModelConfig,
    pub morphology: MorphologyConfig,
    pub tracking: TrackingConfig,
    pub pacing: PacingConfig,
}

impl PipelineConfig {
    /// Reads a TOML file. Missing sections and keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.speed.reference_width > 0.0 && self.speed.reference_width.is_finite()) {
            return Err(Error::InvalidConfig("speed reference width must be positive".into()));
        }
        if !(self.speed.scale >= 0.0 && self.speed.scale.is_finite()) {
            return Err(Error::InvalidConfig("speed scale must be non-negative".into()));
        }
        if let AssociationMode::NearestCentroid { max_distance } = self.tracking.association {
            if !(max_distance >= 0.0) {
                return Err(Error::InvalidConfig(
                    "nearest-centroid max_distance must be non-negative".into(),
                ));
            }
        }
        self.background.validate()
    }
}

/// Everything the pipeline learned from one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Blobs that passed the size gate, in detection order.
    pub blobs: Vec<Blob>,
    /// Crossings emitted for this frame, in emission order.
    pub events: Vec<CrossingEvent>,
    /// Tracked points still under watch after this frame.
    pub tracked: Vec<Point>,
    /// Running count after this frame.
    pub vehicle_count: u64,
    /// The detection line, for overlays.
    pub line: DetectionLine,
}

impl FrameReport {
    /// True when at least one crossing fired this frame.
    pub fn line_triggered(&self) -> bool {
        !self.events.is_empty()
    }
}

/// The per-frame engine: mask, blobs, tracking, crossings.
pub struct CountingPipeline {
    processor: FrameProcessor,
    counter: VehicleCounter,
    config: PipelineConfig,
    last_mask: Option<MotionMask>,
}

impl CountingPipeline {
    /// Builds the pipeline. Fails if the configuration is invalid or the background
    /// model cannot be initialised.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let processor = FrameProcessor::new(config.background.clone(), config.morphology.clone())?;
        Self::with_processor(config, processor)
    }

    /// Assembles a pipeline from a caller-supplied frame processor. The rest of the
    /// configuration is validated the same way as in `new`.
    pub fn with_processor(config: PipelineConfig, processor: FrameProcessor) -> Result<Self> {
        config.validate()?;
        let counter = VehicleCounter::new(
            config.line,
            config.speed,
            config.tracking.association.build(),
            config.tracking.eviction_age(),
        );
        Ok(Self {
            processor,
            counter,
            config,
            last_mask: None,
        })
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        // Stage 1: Motion Mask
        let mask = self.processor.process(frame)?;

        // Stage 2: Blob Extraction & Size Gate
        let blobs = blob_detector::find_blobs(
            &mask,
            self.config.detection.min_width,
            self.config.detection.min_height,
        );

        // Stage 3: Tracking & Line Crossing
        let events = self.counter.update(&blobs, frame.index(), frame.captured_at());

        trace!(
            frame = frame.index(),
            foreground = mask.foreground_pixels(),
            blobs = blobs.len(),
            events = events.len(),
            "frame processed"
        );

        self.last_mask = Some(mask);
        Ok(FrameReport {
            frame_index: frame.index(),
            blobs,
            events,
            tracked: self
                .counter
                .tracked_centroids()
                .iter()
                .map(|c| c.position)
                .collect(),
            vehicle_count: self.counter.vehicle_count(),
            line: self.counter.line(),
        })
    }

    /// The motion mask of the most recently processed frame.
    pub fn last_mask(&self) -> Option<&MotionMask> {
        self.last_mask.as_ref()
    }

    pub fn vehicle_count(&self) -> u64 {
        self.counter.vehicle_count()
    }

    pub fn tracked_centroids(&self) -> &[TrackedCentroid] {
        self.counter.tracked_centroids()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
