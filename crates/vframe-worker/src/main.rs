//! Frame processing worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframe_media::split_video;
use vframe_ml_client::DetectorClient;
use vframe_models::{DetectorSpec, QUERY_ID_KEY};
use vframe_storage::{ContentSource, FrameDirectory};
use vframe_worker::{
    process_frames, proportion_with_answer, refresh_answers, warm_up, AnswerCounter,
    DetectorFrameFactory, FrameAction, PipelineOptions, WarmUpSelection, WorkerConfig,
};

#[derive(Parser)]
#[command(
    name = "vframe-worker",
    version,
    about = "Ask a detector about every frame of a video, caching answers per frame"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding frames/ and frames_metadata/
    #[arg(long, global = true, env = "VFRAME_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a video's frames into the data directory
    Split {
        video: PathBuf,
        /// Only extract the first N minutes
        #[arg(long)]
        minutes: Option<f64>,
    },

    /// Query a sample of frames ahead of time to fill the cache
    WarmUp {
        /// Random share of all frames, in (0, 1]
        #[arg(long, conflicts_with = "indices", required_unless_present = "indices")]
        proportion: Option<f64>,
        /// Explicit frame indices
        #[arg(long, value_delimiter = ',')]
        indices: Vec<u64>,
        #[command(flatten)]
        pool: PoolArgs,
        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Re-check frames whose first answer was inconclusive
    Refresh {
        /// Frame indices (all frames when omitted)
        #[arg(long, value_delimiter = ',')]
        indices: Vec<u64>,
        #[command(flatten)]
        pool: PoolArgs,
        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Process frames in order, counting positive answers
    Process {
        /// Source video the frames were split from
        video: PathBuf,
        /// Write annotated frames to this MP4
        #[arg(long)]
        output: Option<PathBuf>,
        /// Frame action: process or update
        #[arg(long, default_value = "process")]
        action: FrameAction,
        /// First frame index (inclusive)
        #[arg(long)]
        start: Option<u64>,
        /// Last frame index (inclusive)
        #[arg(long)]
        end: Option<u64>,
        /// Caption for the running count drawn on output frames
        #[arg(long, default_value = "Number of frames upside down")]
        caption: String,
        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Report how many frames have cached answers
    Coverage {
        /// Frame indices (all frames when omitted)
        #[arg(long, value_delimiter = ',')]
        indices: Vec<u64>,
        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct PoolArgs {
    /// Look-ahead window
    #[arg(long)]
    buffer_size: Option<usize>,
    /// Concurrent frame actions
    #[arg(long)]
    num_workers: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct DetectorArgs {
    /// Detector name, created on the service if missing
    #[arg(long, default_value = "robot_detector")]
    detector_name: String,
    /// Question the detector answers
    #[arg(long, default_value = "Is the robot currently upside down (feet above head)?")]
    query: String,
    /// Minimum confidence for an answer to be cached
    #[arg(long, default_value_t = vframe_models::DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence_threshold: f64,
    /// Metadata key the answer is stored under
    #[arg(long, default_value = "is_upside_down")]
    answer_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    let mut config = WorkerConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    info!("Worker config: {:?}", config);

    match cli.command {
        Commands::Split { video, minutes } => {
            let frames_dir = config.layout().frames_dir;
            let count = split_video(&video, &frames_dir, minutes).await?;
            info!(frames = count, dir = %frames_dir.display(), "Split complete");
        }

        Commands::WarmUp {
            proportion,
            indices,
            pool,
            detector,
        } => {
            let selection = match proportion {
                Some(p) => WarmUpSelection::Proportion(p),
                None => WarmUpSelection::Indices(indices),
            };
            let factory = build_factory(&config, &detector).await?;
            let summary = warm_up(
                Arc::new(factory),
                &config.layout().frame_directory(),
                selection,
                pool.apply(&config),
                &detector.answer_key,
            )
            .await?;
            info!(
                frames = summary.indices.len(),
                answered = summary.answered,
                "Warm-up complete"
            );
        }

        Commands::Refresh {
            indices,
            pool,
            detector,
        } => {
            let frames = config.layout().frame_directory();
            let indices = or_all_frames(indices, &frames).await?;
            let factory = build_factory(&config, &detector).await?;
            let summary = refresh_answers(
                Arc::new(factory),
                indices,
                pool.apply(&config),
                &detector.answer_key,
            )
            .await?;
            info!(
                frames = summary.indices.len(),
                answered = summary.answered,
                "Refresh complete"
            );
        }

        Commands::Process {
            video,
            output,
            action,
            start,
            end,
            caption,
            detector,
        } => {
            let frames = config.layout().frame_directory();
            let start = match start {
                Some(start) => start,
                None => frames.first_index().await?,
            };
            let end = match end {
                Some(end) => end,
                None => frames.last_index().await?,
            };
            let indices: Vec<u64> = frames
                .discover_indices()
                .await?
                .into_iter()
                .filter(|i| (start..=end).contains(i))
                .collect();
            info!(start, end, frames = indices.len(), "Frame range selected");

            let factory = build_factory(&config, &detector).await?;
            let content: Arc<dyn ContentSource> = Arc::new(frames);
            let mut counter = AnswerCounter::new(&detector.answer_key).with_caption(caption);
            let options = PipelineOptions {
                action,
                output,
                max_pool_size: config.max_pool_size,
            };

            let summary = process_frames(
                &video,
                Arc::new(factory),
                content,
                indices,
                Some(&mut counter),
                &options,
            )
            .await?;
            info!(
                frames = summary.frames,
                encoded = summary.encoded,
                positives = counter.positives(),
                "Processing complete"
            );
        }

        Commands::Coverage { indices, detector } => {
            let frames = config.layout().frame_directory();
            let indices = or_all_frames(indices, &frames).await?;
            let factory = build_factory(&config, &detector).await?;
            let key = detector.answer_key.as_str();

            let queried =
                proportion_with_answer(&factory, &indices, |f| !f.metadata().is_unset(QUERY_ID_KEY))
                    .await?;
            let answered =
                proportion_with_answer(&factory, &indices, |f| !f.metadata().is_unset(key)).await?;
            let positive = proportion_with_answer(&factory, &indices, |f| {
                f.metadata().get_bool(key) == Some(true)
            })
            .await?;

            println!("frames:   {}", indices.len());
            println!("queried:  {:.1}%", queried * 100.0);
            println!("answered: {:.1}%", answered * 100.0);
            println!("{}: {:.1}%", key, positive * 100.0);
        }
    }

    Ok(())
}

impl PoolArgs {
    fn apply(&self, config: &WorkerConfig) -> vframe_worker::PrefetchConfig {
        let mut prefetch = config.prefetch_config();
        if let Some(buffer_size) = self.buffer_size {
            prefetch.buffer_size = buffer_size;
        }
        if let Some(num_workers) = self.num_workers {
            prefetch.num_workers = num_workers;
        }
        prefetch
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn or_all_frames(indices: Vec<u64>, frames: &FrameDirectory) -> Result<Vec<u64>> {
    if !indices.is_empty() {
        return Ok(indices);
    }
    Ok(frames.discover_indices().await?)
}

/// Connect to the detector service and wire up detector-backed frames.
async fn build_factory(config: &WorkerConfig, args: &DetectorArgs) -> Result<DetectorFrameFactory> {
    let client = DetectorClient::from_env().context("Failed to create detector client")?;
    client
        .check_connectivity()
        .await
        .context("Detector service is not reachable")?;

    let spec = DetectorSpec::new(&args.detector_name, &args.query)
        .with_confidence_threshold(args.confidence_threshold);
    let mut detector = client
        .get_or_create_detector(&spec)
        .await
        .with_context(|| format!("Failed to get detector '{}'", spec.name))?;
    // The local threshold decides what gets cached.
    detector.confidence_threshold = args.confidence_threshold;
    info!(detector_id = %detector.id, name = %detector.name, "Using detector");

    let layout = config.layout();
    Ok(DetectorFrameFactory::with_answer_key(
        Arc::new(client),
        detector,
        layout.metadata_store(),
        Arc::new(layout.frame_directory()),
        &args.answer_key,
    ))
}
