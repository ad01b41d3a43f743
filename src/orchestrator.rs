// THEORY:
// The `Orchestrator` drives the counter from a frame source until the source runs
// dry or someone asks it to stop.
//
// Per iteration:
//   stop requested? -> next frame (None ends the run) -> pacing delay
//   -> CountingPipeline::process_frame -> every event to every event sink
//   -> frame, mask and report to the display sink -> loop
//
// State machine: RUNNING -> STOPPED, on source exhaustion, on a stop request, or
// when a frame fails to decode or process. STOPPED is terminal: the source is
// released, the display closed and the sinks flushed, exactly once.
//
// Concurrency: one logical thread. The centroid set and the count live inside the
// pipeline, which only this loop touches. The stop signal is a `watch` channel and
// is only read between frames, so a frame that has started always finishes and
// emits its events.

use crate::core_modules::source::FrameSource;
use crate::error::Result;
use crate::pipeline::{CountingPipeline, PipelineConfig};
use crate::sinks::{DisplaySink, EventSink};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SourceExhausted,
    StopRequested,
    /// A frame could not be acquired or processed.
    Failed,
}

/// Lifecycle of an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Stopped(StopReason),
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub vehicle_count: u64,
    pub events_emitted: u64,
    /// Individual event deliveries that a sink rejected.
    pub sink_failures: u64,
    pub stop_reason: StopReason,
}

/// Requests a stop from outside the loop. Cloneable; any clone can stop the run.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct Orchestrator<S: FrameSource> {
    source: S,
    pipeline: CountingPipeline,
    event_sinks: Vec<Box<dyn EventSink>>,
    display: Option<Box<dyn DisplaySink>>,
    frame_delay: Option<Duration>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    state: PipelineState,
}

impl<S: FrameSource> Orchestrator<S> {
    /// Builds the pipeline around an already opened source. Fails before RUNNING if
    /// the background model cannot be initialised.
    pub fn new(config: PipelineConfig, source: S) -> Result<Self> {
        let frame_delay = config.pacing.frame_delay();
        let pipeline = CountingPipeline::new(config)?;
        Ok(Self::with_pipeline(pipeline, source, frame_delay))
    }

    pub fn with_pipeline(pipeline: CountingPipeline, source: S, frame_delay: Option<Duration>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            source,
            pipeline,
            event_sinks: Vec::new(),
            display: None,
            frame_delay,
            stop_tx,
            stop_rx,
            state: PipelineState::Running,
        }
    }

    pub fn add_event_sink(&mut self, sink: Box<dyn EventSink>) -> &mut Self {
        self.event_sinks.push(sink);
        self
    }

    pub fn set_display(&mut self, display: Box<dyn DisplaySink>) -> &mut Self {
        self.display = Some(display);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn pipeline(&self) -> &CountingPipeline {
        &self.pipeline
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs until the source is exhausted or a stop is requested.
    ///
    /// A frame that cannot be acquired or processed ends the run with that error,
    /// after the STOPPED cleanup has run.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if let PipelineState::Stopped(reason) = self.state {
            return Ok(RunSummary {
                frames_processed: 0,
                vehicle_count: self.pipeline.vehicle_count(),
                events_emitted: 0,
                sink_failures: 0,
                stop_reason: reason,
            });
        }
        info!(
            sinks = self.event_sinks.len(),
            display = self.display.is_some(),
            "counting pipeline running"
        );

        let mut frames_processed = 0u64;
        let mut events_emitted = 0u64;
        let mut sink_failures = 0u64;

        let outcome = loop {
            if *self.stop_rx.borrow() {
                break Ok(StopReason::StopRequested);
            }

            // --- 1. Acquire ---
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(StopReason::SourceExhausted),
                Err(e) => break Err(e),
            };

            // --- 2. Pace ---
            if let Some(delay) = self.frame_delay {
                tokio::time::sleep(delay).await;
            }

            // --- 3. Detect, track, count ---
            let report = match self.pipeline.process_frame(&frame) {
                Ok(report) => report,
                Err(e) => break Err(e),
            };
            frames_processed += 1;

            // --- 4. Emit ---
            for event in &report.events {
                events_emitted += 1;
                for sink in self.event_sinks.iter_mut() {
                    if let Err(e) = sink.emit(event, &frame) {
                        sink_failures += 1;
                        warn!(sink = sink.name(), count = event.count, error = %e, "event sink failed");
                    }
                }
            }

            // --- 5. Display ---
            if let (Some(display), Some(mask)) = (self.display.as_mut(), self.pipeline.last_mask()) {
                if let Err(e) = display.show(&frame, mask, &report) {
                    warn!(frame = frame.index(), error = %e, "display sink failed");
                }
            }

            debug!(
                frame = frame.index(),
                blobs = report.blobs.len(),
                events = report.events.len(),
                tracked = report.tracked.len(),
                "frame complete"
            );
        };

        let reason = match &outcome {
            Ok(reason) => *reason,
            Err(_) => StopReason::Failed,
        };
        self.shut_down(reason);

        let summary = RunSummary {
            frames_processed,
            vehicle_count: self.pipeline.vehicle_count(),
            events_emitted,
            sink_failures,
            stop_reason: outcome?,
        };
        info!(
            frames = summary.frames_processed,
            vehicles = summary.vehicle_count,
            sink_failures = summary.sink_failures,
            reason = ?summary.stop_reason,
            "counting pipeline stopped"
        );
        Ok(summary)
    }

    fn shut_down(&mut self, reason: StopReason) {
        if matches!(self.state, PipelineState::Stopped(_)) {
            return;
        }
        self.state = PipelineState::Stopped(reason);
        self.source.release();
        if let Some(display) = self.display.as_mut() {
            display.close();
        }
        for sink in self.event_sinks.iter_mut() {
            if let Err(e) = sink.flush() {
                error!(sink = sink.name(), error = %e, "failed to flush event sink");
            }
        }
    }
}
