// THEORY:
// Sinks are the outbound side of the counter. The orchestrator hands every
// crossing event, together with the frame it was detected in, to each event sink
// in turn. A failing sink is logged and skipped: losing one record must never stop
// detection.
//
// Shipped sinks:
// - `CsvEventLog`: append-only `Vehicle ID,Speed (km/h),Timestamp` rows.
// - `SnapshotWriter`: a JPEG crop of the crossing region per event.
// - `LogSink`: one `tracing` line per event.
// - `ChannelSink`: forwards events over a tokio channel to an embedding application.
//
// A `DisplaySink` receives every processed frame, its mask and its report. The
// library ships none; rendering lives with the OpenCV companion binary.

use crate::core_modules::counter::CrossingEvent;
use crate::core_modules::frame::{Frame, MotionMask};
use crate::error::{Error, Result};
use crate::pipeline::FrameReport;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const CSV_HEADER: &str = "Vehicle ID,Speed (km/h),Timestamp";

/// Receives crossing events in emission order.
pub trait EventSink {
    fn name(&self) -> &str;

    /// Records one event. `frame` is the frame the event was detected in.
    fn emit(&mut self, event: &CrossingEvent, frame: &Frame) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives every processed frame for visualisation.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame, mask: &MotionMask, report: &FrameReport) -> Result<()>;

    /// Tears down any windows or surfaces. Called once on STOPPED.
    fn close(&mut self) {}
}

/// Appends one CSV row per event. Writes the header only when the file is new or empty.
pub struct CsvEventLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvEventLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{}", CSV_HEADER)?;
            writer.flush()?;
        }
        debug!(path = %path.display(), "opened csv event log");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Formats one CSV data row. The speed is already rounded, so it is written in
/// its shortest form (`3.6`, `4.0`).
pub fn csv_row(event: &CrossingEvent) -> String {
    format!(
        "{},{:?},{}",
        event.count,
        event.speed,
        event.formatted_timestamp()
    )
}

impl EventSink for CsvEventLog {
    fn name(&self) -> &str {
        "csv"
    }

    fn emit(&mut self, event: &CrossingEvent, _frame: &Frame) -> Result<()> {
        writeln!(self.writer, "{}", csv_row(event))?;
        // Each row is durable on its own.
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Saves the crossing region of the frame as `vehicle_<count>_<timestamp>.jpg`.
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Creates the snapshot directory if it does not exist.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn snapshot_path(&self, event: &CrossingEvent) -> PathBuf {
        let stamp = event.formatted_timestamp().replace(':', "-");
        self.dir
            .join(format!("vehicle_{}_{}.jpg", event.count, stamp))
    }
}

impl EventSink for SnapshotWriter {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn emit(&mut self, event: &CrossingEvent, frame: &Frame) -> Result<()> {
        let crop = frame.crop(&event.region).ok_or_else(|| {
            Error::Sink(format!(
                "crossing region {:?} lies outside the {}x{} frame",
                event.region,
                frame.width(),
                frame.height()
            ))
        })?;
        // JPEG has no alpha channel.
        crop.to_rgb8().save(self.snapshot_path(event))?;
        Ok(())
    }
}

/// Logs each crossing at info level.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn emit(&mut self, event: &CrossingEvent, _frame: &Frame) -> Result<()> {
        info!(
            "Vehicle {} detected. Speed: {:?} km/h at {}",
            event.count,
            event.speed,
            event.formatted_timestamp()
        );
        Ok(())
    }
}

/// Forwards events to an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CrossingEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CrossingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn emit(&mut self, event: &CrossingEvent, _frame: &Frame) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::Sink("event receiver was dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::{BoundingBox, Point};
    use chrono::{Local, TimeZone};
    use image::{DynamicImage, Rgb, RgbImage};

    fn event(count: u64, region: BoundingBox) -> CrossingEvent {
        CrossingEvent {
            count,
            speed: 3.6,
            timestamp: Local.with_ymd_and_hms(2024, 5, 17, 8, 30, 5).unwrap(),
            frame_index: 12,
            region,
            centroid: region.centroid(),
        }
    }

    fn frame() -> Frame {
        Frame::new(12, DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 150, Rgb([10, 20, 30]))))
    }

    #[test]
    fn csv_row_layout() {
        let row = csv_row(&event(4, BoundingBox::new(0, 0, 100, 100)));
        assert_eq!(row, "4,3.6,2024-05-17 08:30:05");

        let mut whole = event(5, BoundingBox::new(0, 0, 100, 100));
        whole.speed = 4.0;
        assert_eq!(csv_row(&whole), "5,4.0,2024-05-17 08:30:05");
    }

    #[test]
    fn csv_log_writes_header_once_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("car_speed.csv");
        let region = BoundingBox::new(0, 0, 100, 100);

        {
            let mut log = CsvEventLog::open(&path).unwrap();
            assert_eq!(log.path(), path.as_path());
            log.emit(&event(1, region), &frame()).unwrap();
        }
        {
            let mut log = CsvEventLog::open(&path).unwrap();
            log.emit(&event(2, region), &frame()).unwrap();
            log.flush().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,3.6,"));
        assert!(lines[2].starts_with("2,3.6,"));
    }

    #[test]
    fn snapshot_is_cropped_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::create(dir.path().join("snapshots")).unwrap();
        let crossing = event(3, BoundingBox::new(20, 30, 100, 90));
        writer.emit(&crossing, &frame()).unwrap();

        let path = writer.snapshot_path(&crossing);
        assert!(path.ends_with("vehicle_3_2024-05-17 08-30-05.jpg"));
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (100, 90));
    }

    #[test]
    fn snapshot_outside_frame_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::create(dir.path()).unwrap();
        let crossing = event(1, BoundingBox::new(500, 500, 100, 100));
        assert!(matches!(writer.emit(&crossing, &frame()), Err(Error::Sink(_))));
    }

    #[test]
    fn channel_sink_forwards_and_reports_dropped_receiver() {
        let (mut sink, mut rx) = ChannelSink::new();
        let crossing = event(1, BoundingBox::new(0, 0, 100, 100));
        sink.emit(&crossing, &frame()).unwrap();
        assert_eq!(rx.try_recv().unwrap().centroid, Point::new(50, 50));

        drop(rx);
        assert!(sink.emit(&crossing, &frame()).is_err());
    }
}
