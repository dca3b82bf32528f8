//! keypoint-targets CLI: build a target database, detect targets in an
//! image, or evaluate against a labelled test list.

use clap::{Args, Parser, Subcommand};
use keypoint_targets::detect::{detect_targets, save_model_keypoints, ImageLoader, OverlayRenderer};
use keypoint_targets::recognition::{
    load_reference_list, DatabaseError, EvaluationHarness, MatchResult,
};
use keypoint_targets::{orb_engine, AppConfig, RecognitionEngine};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[cfg(not(feature = "tracing"))]
use keypoint_targets::core::init_with_level;
#[cfg(feature = "tracing")]
use keypoint_targets::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "keypoint-targets")]
#[command(about = "Recognize known planar targets (e.g. banknotes) with keypoint matching")]
#[command(version)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the target database from the reference list and report it.
    Build(BuildArgs),
    /// Detect targets in one image.
    Detect(DetectArgs),
    /// Evaluate detection over the test list.
    Evaluate(EvaluateArgs),
    /// Write the effective configuration as JSON.
    InitConfig {
        /// Output path of the configuration file.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct BuildArgs {
    /// Render each model's keypoints into the output directory.
    #[arg(long)]
    save_keypoints: bool,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Query image.
    #[arg(long)]
    image: PathBuf,
    /// Write detections as JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Write an overlay of the detections (PNG).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct EvaluateArgs {
    /// Render every processed test image with its detections.
    #[arg(long)]
    save_results: bool,
}

#[derive(Serialize)]
struct DetectReport<'a> {
    image: &'a PathBuf,
    elapsed_ms: f64,
    detections: &'a [MatchResult],
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    init_with_level(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    })?;

    #[cfg(feature = "tracing")]
    {
        tracing_log::LogTracer::init()?;
        init_tracing(false);
    }

    let cfg = match &cli.config {
        Some(path) => AppConfig::load_json(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Build(args) => run_build(&cfg, &args),
        Commands::Detect(args) => run_detect(&cfg, &args),
        Commands::Evaluate(args) => run_evaluate(&cfg, &args),
        Commands::InitConfig { out } => {
            cfg.write_json(&out)?;
            log::info!("wrote {}", out.display());
            Ok(())
        }
    }
}

fn build_engine(cfg: &AppConfig, loader: &ImageLoader) -> CliResult<RecognitionEngine> {
    let entries = load_reference_list(&cfg.reference_list, &cfg.reference_dir)?;
    log::info!(
        "initializing recognition database with {} reference image(s)",
        entries.len()
    );
    let mut engine = orb_engine(cfg);
    match engine.build_database(&entries, loader) {
        Ok(n) => log::info!("{n} target(s) ready"),
        // An empty database is usable: detection just finds nothing.
        Err(DatabaseError::NoTargets) => {
            log::warn!("no reference target could be built, continuing with an empty database")
        }
        Err(err) => return Err(err.into()),
    }
    Ok(engine)
}

fn run_build(cfg: &AppConfig, args: &BuildArgs) -> CliResult<()> {
    let loader = ImageLoader::default();
    let engine = build_engine(cfg, &loader)?;

    if args.save_keypoints {
        fs::create_dir_all(&cfg.output_dir)?;
    }
    for model in engine.database().models() {
        println!(
            "target {:>6}  keypoints {:>5}  {}",
            model.id(),
            model.len(),
            model.source().map(|p| p.display().to_string()).unwrap_or_default()
        );
        if args.save_keypoints {
            match save_model_keypoints(model, &loader, &cfg.output_dir, &cfg.tag) {
                Ok(path) => log::debug!("wrote {}", path.display()),
                Err(err) => log::warn!("keypoint dump for target {}: {err}", model.id()),
            }
        }
    }
    Ok(())
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(cfg)))]
fn run_detect(cfg: &AppConfig, args: &DetectArgs) -> CliResult<()> {
    let loader = ImageLoader::default();
    let engine = build_engine(cfg, &loader)?;
    let img = loader.load_luma(&args.image)?;

    let start = Instant::now();
    let detections = detect_targets(&engine, &img);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
    log::info!(
        "detected {} target(s) in {elapsed_ms:.1} ms",
        detections.len()
    );

    if let Some(path) = &args.overlay {
        let view = keypoint_targets::detect::gray_view(&img);
        OverlayRenderer::from_font_path(cfg.font.as_deref())
            .draw(&view, &detections)
            .save(path)?;
    }

    let report = DetectReport {
        image: &args.image,
        elapsed_ms,
        detections: &detections,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_evaluate(cfg: &AppConfig, args: &EvaluateArgs) -> CliResult<()> {
    let loader = ImageLoader::default();
    let engine = build_engine(cfg, &loader)?;
    let renderer = OverlayRenderer::from_font_path(cfg.font.as_deref());
    let options = cfg.evaluation_options(args.save_results);
    let report_path = options.report_path();

    let harness = EvaluationHarness::new(&engine, &loader, options).with_renderer(&renderer);
    let report = harness.run(&cfg.test_list, &cfg.test_dir)?;

    let m = report.aggregate.metrics;
    println!(
        "global precision: {:.4} | global recall: {:.4} | global accuracy: {:.4} ({} image(s), {} skipped)",
        m.precision, m.recall, m.accuracy, report.aggregate.processed, report.aggregate.skipped
    );
    log::info!("report written to {}", report_path.display());
    Ok(())
}
