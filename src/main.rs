use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use traffic_counter::core_modules::tracker::AssociationMode;
use traffic_counter::sinks::{CsvEventLog, LogSink, SnapshotWriter};
use traffic_counter::{ImageSequenceSource, Orchestrator, PipelineConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Association {
    /// Add a tracked point for every detection in every frame.
    EveryDetection,
    /// Move the nearest tracked point instead of adding a new one.
    NearestCentroid,
}

#[derive(Parser, Debug)]
#[command(name = "traffic_counter", about = "Count vehicles crossing a line in a frame sequence")]
struct Args {
    /// Directory of frame images, processed in file-name order.
    #[arg(long, value_name = "DIR")]
    frames: PathBuf,
    /// TOML pipeline configuration. Command-line flags override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, default_value = "car_speed.csv")]
    csv: PathBuf,
    #[arg(long, default_value = "snapshots")]
    snapshots: PathBuf,
    /// Do not write snapshot images.
    #[arg(long)]
    no_snapshots: bool,
    #[arg(long)]
    line_position: Option<u32>,
    #[arg(long)]
    line_offset: Option<u32>,
    #[arg(long)]
    min_width: Option<u32>,
    #[arg(long)]
    min_height: Option<u32>,
    /// Frames per second to pace processing at. 0 runs as fast as possible.
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long, value_enum)]
    association: Option<Association>,
    /// Match radius in pixels for the nearest-centroid strategy.
    #[arg(long, default_value_t = 50.0)]
    match_distance: f64,
    /// Evict tracked points not seen for this many frames. 0 disables eviction.
    #[arg(long, conflicts_with = "no_eviction")]
    max_centroid_age: Option<u64>,
    /// Keep every unretired tracked point for the whole run.
    #[arg(long)]
    no_eviction: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(position) = self.line_position {
            config.line.position = position;
        }
        if let Some(offset) = self.line_offset {
            config.line.offset = offset;
        }
        if let Some(min_width) = self.min_width {
            config.detection.min_width = min_width;
        }
        if let Some(min_height) = self.min_height {
            config.detection.min_height = min_height;
        }
        if let Some(fps) = self.fps {
            config.pacing.frames_per_second = fps;
        }
        if let Some(association) = self.association {
            config.tracking.association = match association {
                Association::EveryDetection => AssociationMode::EveryDetection,
                Association::NearestCentroid => AssociationMode::NearestCentroid {
                    max_distance: self.match_distance,
                },
            };
        }
        if let Some(age) = self.max_centroid_age {
            config.tracking.max_centroid_age = Some(age);
        }
        if self.no_eviction {
            config.tracking.max_centroid_age = None;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("traffic_counter=info")),
        )
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;
    info!(
        line = config.line.position,
        offset = config.line.offset,
        min_width = config.detection.min_width,
        min_height = config.detection.min_height,
        "configuration loaded"
    );

    let source = ImageSequenceSource::open(&args.frames)
        .with_context(|| format!("opening frame directory {}", args.frames.display()))?;
    info!(frames = source.remaining(), "frame source ready");

    let mut orchestrator = Orchestrator::new(config, source).context("initialising pipeline")?;
    orchestrator.add_event_sink(Box::new(LogSink));
    orchestrator.add_event_sink(Box::new(
        CsvEventLog::open(&args.csv)
            .with_context(|| format!("opening csv log {}", args.csv.display()))?,
    ));
    if !args.no_snapshots {
        orchestrator.add_event_sink(Box::new(
            SnapshotWriter::create(&args.snapshots).with_context(|| {
                format!("creating snapshot directory {}", args.snapshots.display())
            })?,
        ));
    }

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("stop requested, finishing current frame");
                stop.stop();
            }
            Err(e) => warn!(error = %e, "could not listen for ctrl-c"),
        }
    });

    let summary = orchestrator.run().await?;
    println!(
        "Processed {} frames, counted {} vehicles ({:?}).",
        summary.frames_processed, summary.vehicle_count, summary.stop_reason
    );
    if summary.sink_failures > 0 {
        warn!(failures = summary.sink_failures, "some events could not be recorded");
    }
    Ok(())
}
