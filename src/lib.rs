// THEORY:
// This file is the main entry point for the `traffic_counter` library crate. It
// exposes the counting pipeline and its collaborators as a clean public API.
//
// The crate is layered the same way a frame flows through it:
// - `core_modules`: the spatial layer (background model, frame processor, blob
//   detector) and the behavioral layer (tracker, line crossing, speed, counter).
// - `pipeline`: the single-frame API and its configuration.
// - `orchestrator`: the RUNNING/STOPPED loop that pulls frames and pushes events.
// - `sinks`: where crossing events and annotated frames go.

pub mod core_modules;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod sinks;

pub use crate::core_modules::blob::{Blob, BoundingBox, Point};
pub use crate::core_modules::counter::CrossingEvent;
pub use crate::core_modules::frame::{Frame, MotionMask};
pub use crate::core_modules::source::{FrameSource, ImageSequenceSource, InMemorySource};
pub use crate::error::{Error, Result};
pub use crate::orchestrator::{Orchestrator, PipelineState, RunSummary, StopHandle, StopReason};
pub use crate::pipeline::{CountingPipeline, FrameReport, PipelineConfig};
