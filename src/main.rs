// Command-line front end for the triage engine. Each subcommand decodes one image
// (or a directory of frames), runs one domain analysis and prints the assessment as
// pretty JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use env_logger::{Builder, Env};
use image::RgbImage;
use log::{info, LevelFilter};

use triage_vision::config::TriageConfig;
use triage_vision::core_modules::filters;
use triage_vision::core_modules::utils::image_helper::image_helper;
use triage_vision::parallel_pipeline::ParallelPipeline;
use triage_vision::pipeline::{self, FieldCounts, TriagePipeline};

#[derive(Subcommand)]
enum Commands {
    /// Measure and grade the most prominent skin lesion
    Derma {
        image: PathBuf,
        /// Pixels per millimetre; skips coin calibration
        #[arg(long)]
        scale: Option<f64>,
    },

    /// Grade a brain scan given the classifier's tumour confidence
    Neuro {
        image: PathBuf,
        /// Tumour confidence in percent (0-100)
        #[arg(long)]
        confidence: f64,
        /// Gray probability heatmap; derived from the scan when absent
        #[arg(long)]
        heatmap: Option<PathBuf>,
    },

    /// Assess an operative field image
    Surgery {
        image: PathBuf,
        #[arg(long, default_value_t = 0)]
        tools: u32,
        #[arg(long, default_value_t = 0)]
        hands: u32,
    },

    /// Build a per-second timeline from a directory of decoded video frames
    Video {
        frames: PathBuf,
        /// Frame rate of the source video
        #[arg(long)]
        fps: f64,
    },

    /// Report the scale ratio found from a reference coin
    Calibrate { image: PathBuf },
}

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Rule-based severity scoring for dermatology, neurology and surgery images")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write an annotated copy of the input here (PNG)
    #[arg(long, global = true)]
    annotated: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(cli: &Cli) {
    // Without -v/-q, RUST_LOG wins when set.
    let use_env = cli.verbose == 0 && !cli.quiet && std::env::var_os("RUST_LOG").is_some();
    let mut builder = if use_env {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(log_level(cli.verbose, cli.quiet));
        b
    };
    builder.init();
}

fn read_image(path: &Path) -> Result<RgbImage> {
    pipeline::load_image(path).with_context(|| format!("failed to read image {}", path.display()))
}

fn write_annotated(path: Option<&PathBuf>, image: &RgbImage) -> Result<()> {
    if let Some(path) = path {
        image_helper::save_png(path, image).with_context(|| format!("failed to write {}", path.display()))?;
        info!("annotated copy written to {}", path.display());
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("failed to serialise assessment")?);
    Ok(())
}

fn read_frames(dir: &Path) -> Result<Vec<RgbImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    paths.iter().map(|p| read_image(p)).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => TriageConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => TriageConfig::default(),
    };
    let triage = TriagePipeline::new(config);
    let annotated = cli.annotated.as_ref();

    match &cli.command {
        Commands::Derma { image, scale } => {
            let photo = read_image(image)?;
            let analysis = triage.analyze_derma(&photo, *scale)?;
            write_annotated(annotated, &analysis.annotate(&photo))?;
            print_json(&analysis.assessment)
        }
        Commands::Neuro { image, confidence, heatmap } => {
            let scan = read_image(image)?;
            let heatmap = match heatmap {
                Some(path) => Some(filters::to_gray(&read_image(path)?)),
                None => None,
            };
            let analysis = triage.analyze_neuro(&scan, Some(*confidence), heatmap.as_ref())?;
            if let Some(copy) = analysis.annotate(&scan) {
                write_annotated(annotated, &copy)?;
            }
            print_json(&analysis.assessment)
        }
        Commands::Surgery { image, tools, hands } => {
            let field = read_image(image)?;
            let analysis = triage.analyze_surgery(&field, Some(FieldCounts { tools: *tools, hands: *hands }))?;
            write_annotated(annotated, &analysis.annotate(&field))?;
            print_json(&analysis.assessment)
        }
        Commands::Video { frames, fps } => {
            let frames = read_frames(frames)?;
            info!("{} frames loaded", frames.len());
            let parallel = ParallelPipeline::new(triage);
            let timeline = parallel.analyze_video(frames, *fps).await?;
            print_json(&timeline)
        }
        Commands::Calibrate { image } => {
            let photo = read_image(image)?;
            let report = triage.calibrate(&photo);
            if let Some(coin) = report.coin {
                let mut copy = photo.clone();
                image_helper::draw_circle(&mut copy, (coin.center_x, coin.center_y), coin.radius, image_helper::YELLOW);
                write_annotated(annotated, &copy)?;
            }
            print_json(&report)
        }
    }
}
