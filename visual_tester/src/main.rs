mod highgui_display;
mod video_source;

use anyhow::{Context, Result};
use clap::Parser;
use highgui_display::HighGuiDisplay;
use opencv::{core, videoio::VideoWriter};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use traffic_counter::sinks::{CsvEventLog, LogSink, SnapshotWriter};
use traffic_counter::{Orchestrator, PipelineConfig};
use video_source::VideoFileSource;

#[derive(Parser, Debug)]
#[command(name = "visual_tester", about = "Play a video through the vehicle counter")]
struct Args {
    /// Input video path.
    input: String,
    /// Optional path to record the annotated video to.
    #[arg(long)]
    output: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "car_speed.csv")]
    csv: PathBuf,
    #[arg(long, default_value = "snapshots")]
    snapshots: PathBuf,
}

fn open_writer(path: &str, fps: f64, width: i32, height: i32) -> Result<VideoWriter> {
    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(path, fourcc, fps, core::Size::new(width, height), true)?;
    Ok(writer)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("traffic_counter=info,visual_tester=info")),
        )
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };

    // --- 2. Video I/O Initialization ---
    let source = VideoFileSource::open(&args.input)?;
    let writer = match &args.output {
        Some(path) => {
            let (width, height) = source.frame_size();
            let fps = if source.fps() > 0.0 { source.fps() } else { 30.0 };
            Some(open_writer(path, fps, width, height).context("opening output video")?)
        }
        None => None,
    };

    // --- 3. Counter Initialization ---
    let mut orchestrator = Orchestrator::new(config, source)?;
    orchestrator.add_event_sink(Box::new(LogSink));
    orchestrator.add_event_sink(Box::new(CsvEventLog::open(&args.csv)?));
    orchestrator.add_event_sink(Box::new(SnapshotWriter::create(&args.snapshots)?));
    let stop = orchestrator.stop_handle();
    orchestrator.set_display(Box::new(HighGuiDisplay::new(stop, writer)));

    // --- 4. Main Processing Loop ---
    let summary = orchestrator.run().await?;
    println!(
        "Processing complete: {} frames, {} vehicles.",
        summary.frames_processed, summary.vehicle_count
    );
    if let Some(path) = &args.output {
        println!("Output saved to {}", path);
    }
    Ok(())
}
