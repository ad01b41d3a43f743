mod common;

use common::synthetic_frames::{empty_frame, frame_with_blobs, moving_blob_sequence};
use chrono::{Local, TimeZone};
use std::sync::{Arc, Mutex};
use traffic_counter::core_modules::line_crossing::DetectionLine;
use traffic_counter::sinks::{ChannelSink, CsvEventLog, DisplaySink, EventSink, SnapshotWriter};
use traffic_counter::{
    CountingPipeline, CrossingEvent, Error, Frame, FrameReport, InMemorySource, MotionMask,
    Orchestrator, PipelineConfig, StopHandle, StopReason,
};

const WIDTH: u32 = 400;
const HEIGHT: u32 = 400;
const LINE: u32 = 200;

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.line = DetectionLine::new(LINE, 6);
    config.pacing.frames_per_second = 0;
    config
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CrossingEvent>) -> Vec<CrossingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn blob_passing_the_line_counts_once_at_three_point_six() {
    let rows = [LINE - 20, LINE - 10, LINE, LINE + 10, LINE + 20];
    let frames = moving_blob_sequence(WIDTH, HEIGHT, 200, &rows, 100);
    let mut orchestrator = Orchestrator::new(config(), InMemorySource::new(frames)).unwrap();
    let (sink, mut rx) = ChannelSink::new();
    orchestrator.add_event_sink(Box::new(sink));

    let summary = orchestrator.run().await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(summary.frames_processed, 6);
    assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
    assert_eq!(events.len(), 1, "events: {events:?}");
    assert_eq!(events[0].count, 1);
    assert_eq!(events[0].speed, 3.6);
    assert_eq!(events[0].region.width, 100);
    assert_eq!(events[0].centroid.y, LINE);
    assert_eq!(events[0].frame_index, 3);
}

#[tokio::test]
async fn two_blobs_in_band_yield_consecutive_counts() {
    let frames = vec![
        empty_frame(WIDTH, HEIGHT),
        frame_with_blobs(WIDTH, HEIGHT, &[(80, LINE - 2, 100), (300, LINE + 3, 100)]),
    ];
    let mut orchestrator = Orchestrator::new(config(), InMemorySource::new(frames)).unwrap();
    let (sink, mut rx) = ChannelSink::new();
    orchestrator.add_event_sink(Box::new(sink));

    let summary = orchestrator.run().await.unwrap();
    let events = drain(&mut rx);

    let counts: Vec<u64> = events.iter().map(|e| e.count).collect();
    assert_eq!(counts, vec![1, 2]);
    assert!(events.iter().all(|e| e.frame_index == 1));
    assert_eq!(summary.vehicle_count, 2);
    assert_eq!(summary.events_emitted, 2);
}

#[tokio::test]
async fn empty_source_stops_cleanly() {
    let mut orchestrator =
        Orchestrator::new(config(), InMemorySource::new(Vec::new())).unwrap();
    let (sink, mut rx) = ChannelSink::new();
    orchestrator.add_event_sink(Box::new(sink));

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.frames_processed, 0);
    assert_eq!(summary.vehicle_count, 0);
    assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
    assert!(drain(&mut rx).is_empty());
    assert!(orchestrator.source().is_released());
}

#[test]
fn undersized_blob_never_tracks_or_counts() {
    let mut pipeline = CountingPipeline::new(config()).unwrap();
    let frames = [
        empty_frame(WIDTH, HEIGHT),
        frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE, 76)]),
        frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE + 1, 76)]),
    ];
    for (i, image) in frames.into_iter().enumerate() {
        let report = pipeline.process_frame(&Frame::new(i as u64, image)).unwrap();
        assert!(report.blobs.is_empty());
        assert!(report.events.is_empty());
    }
    assert!(pipeline.tracked_centroids().is_empty());
    assert!(pipeline.last_mask().unwrap().foreground_pixels() > 0);
}

#[test]
fn blob_exactly_at_band_edge_is_not_counted() {
    let mut pipeline = CountingPipeline::new(config()).unwrap();
    pipeline
        .process_frame(&Frame::new(0, empty_frame(WIDTH, HEIGHT)))
        .unwrap();
    let report = pipeline
        .process_frame(&Frame::new(1, frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE + 6, 100)])))
        .unwrap();
    assert_eq!(report.blobs.len(), 1);
    assert!(report.events.is_empty());
    assert!(!report.line_triggered());
    assert_eq!(report.tracked.len(), 1);
}

#[test]
fn wide_blob_reports_proportional_speed() {
    let mut pipeline = CountingPipeline::new(config()).unwrap();
    pipeline
        .process_frame(&Frame::new(0, empty_frame(WIDTH, HEIGHT)))
        .unwrap();
    let report = pipeline
        .process_frame(&Frame::new(1, frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE, 250)])))
        .unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].speed, 9.0);
    assert!(report.line_triggered());
}

struct FailingSink;

impl EventSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn emit(&mut self, _event: &CrossingEvent, _frame: &Frame) -> traffic_counter::Result<()> {
        Err(Error::Sink("storage offline".into()))
    }
}

#[tokio::test]
async fn failing_sink_does_not_halt_detection() {
    let frames = vec![
        empty_frame(WIDTH, HEIGHT),
        frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE, 100)]),
        empty_frame(WIDTH, HEIGHT),
        frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE + 1, 100)]),
    ];
    let mut orchestrator = Orchestrator::new(config(), InMemorySource::new(frames)).unwrap();
    let (sink, mut rx) = ChannelSink::new();
    orchestrator.add_event_sink(Box::new(FailingSink));
    orchestrator.add_event_sink(Box::new(sink));

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.sink_failures, summary.events_emitted);
    assert!(summary.events_emitted >= 2);
    assert_eq!(drain(&mut rx).len() as u64, summary.events_emitted);
}

#[derive(Default)]
struct Seen {
    frames: Vec<u64>,
    counts: Vec<u64>,
    closed: bool,
}

struct RecordingDisplay {
    seen: Arc<Mutex<Seen>>,
    stop_after: Option<(usize, StopHandle)>,
}

impl DisplaySink for RecordingDisplay {
    fn show(
        &mut self,
        frame: &Frame,
        mask: &MotionMask,
        report: &FrameReport,
    ) -> traffic_counter::Result<()> {
        assert_eq!((mask.width(), mask.height()), (frame.width(), frame.height()));
        let mut seen = self.seen.lock().unwrap();
        seen.frames.push(frame.index());
        seen.counts.push(report.vehicle_count);
        if let Some((limit, handle)) = &self.stop_after {
            if seen.frames.len() >= *limit {
                handle.stop();
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.seen.lock().unwrap().closed = true;
    }
}

#[tokio::test]
async fn display_sees_every_frame_and_is_closed() {
    let rows = [LINE - 10, LINE, LINE + 10];
    let frames = moving_blob_sequence(WIDTH, HEIGHT, 200, &rows, 100);
    let mut orchestrator = Orchestrator::new(config(), InMemorySource::new(frames)).unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    orchestrator.set_display(Box::new(RecordingDisplay {
        seen: Arc::clone(&seen),
        stop_after: None,
    }));

    orchestrator.run().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.frames, vec![0, 1, 2, 3]);
    assert_eq!(seen.counts, vec![0, 0, 1, 1]);
    assert!(seen.closed);
}

#[tokio::test]
async fn stop_request_takes_effect_between_frames() {
    let rows = [LINE - 40, LINE - 30, LINE - 20, LINE - 10, LINE];
    let frames = moving_blob_sequence(WIDTH, HEIGHT, 200, &rows, 100);
    let mut orchestrator = Orchestrator::new(config(), InMemorySource::new(frames)).unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let handle = orchestrator.stop_handle();
    orchestrator.set_display(Box::new(RecordingDisplay {
        seen: Arc::clone(&seen),
        stop_after: Some((2, handle)),
    }));

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.stop_reason, StopReason::StopRequested);
    assert!(orchestrator.source().is_released());
    assert!(seen.lock().unwrap().closed);
}

#[tokio::test]
async fn image_sequence_run_writes_csv_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    let rows = [LINE - 10, LINE, LINE + 10];
    for (i, image) in moving_blob_sequence(WIDTH, HEIGHT, 200, &rows, 100)
        .into_iter()
        .enumerate()
    {
        image
            .save(frames_dir.join(format!("frame_{i:04}.png")))
            .unwrap();
    }

    let source = traffic_counter::ImageSequenceSource::open(&frames_dir).unwrap();
    let mut orchestrator = Orchestrator::new(config(), source).unwrap();
    let csv_path = dir.path().join("car_speed.csv");
    let snapshots = dir.path().join("snapshots");
    orchestrator.add_event_sink(Box::new(CsvEventLog::open(&csv_path).unwrap()));
    orchestrator.add_event_sink(Box::new(SnapshotWriter::create(&snapshots).unwrap()));

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.vehicle_count, 1);

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("1,3.6,"));

    let snapshot_files: Vec<_> = std::fs::read_dir(&snapshots).unwrap().collect();
    assert_eq!(snapshot_files.len(), 1);
}

#[tokio::test]
async fn corrupt_frame_mid_sequence_fails_the_run_after_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [LINE - 10, LINE];
    for (i, image) in moving_blob_sequence(WIDTH, HEIGHT, 200, &rows, 100)
        .into_iter()
        .enumerate()
    {
        image.save(dir.path().join(format!("frame_{i:04}.png"))).unwrap();
    }
    std::fs::write(dir.path().join("frame_0001a.png"), b"not a png").unwrap();

    let source = traffic_counter::ImageSequenceSource::open(dir.path()).unwrap();
    assert_eq!(source.remaining(), 4);
    let mut orchestrator = Orchestrator::new(config(), source).unwrap();
    let (sink, mut rx) = ChannelSink::new();
    orchestrator.add_event_sink(Box::new(sink));
    let seen = Arc::new(Mutex::new(Seen::default()));
    orchestrator.set_display(Box::new(RecordingDisplay {
        seen: Arc::clone(&seen),
        stop_after: None,
    }));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(Error::FrameDecode(_))), "{result:?}");
    assert_eq!(
        orchestrator.state(),
        traffic_counter::PipelineState::Stopped(StopReason::Failed)
    );
    assert_eq!(orchestrator.pipeline().vehicle_count(), 0);
    assert_eq!(orchestrator.source().remaining(), 0);
    assert_eq!(seen.lock().unwrap().frames, vec![0, 1]);
    assert!(seen.lock().unwrap().closed);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn crossing_is_stamped_with_frame_capture_time() {
    let mut pipeline = CountingPipeline::new(config()).unwrap();
    pipeline
        .process_frame(&Frame::new(0, empty_frame(WIDTH, HEIGHT)))
        .unwrap();
    let captured = Local.with_ymd_and_hms(2023, 11, 2, 6, 15, 40).unwrap();
    let frame = Frame::with_timestamp(
        1,
        captured,
        frame_with_blobs(WIDTH, HEIGHT, &[(200, LINE, 100)]),
    );
    let report = pipeline.process_frame(&frame).unwrap();

    assert_eq!(frame.captured_at(), captured);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].timestamp, captured);
    assert_eq!(
        traffic_counter::sinks::csv_row(&report.events[0]),
        "1,3.6,2023-11-02 06:15:40"
    );
}
