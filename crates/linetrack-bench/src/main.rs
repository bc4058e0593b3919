//! linetrack-bench: run the line pipeline on a still image.
//!
//! Loads a camera snapshot, runs the pipeline with configurable
//! parameters and prints per-stage diagnostics. Useful for:
//!
//! - Tuning the threshold and erosion for a new floor or lighting setup
//! - Checking which segments survive the length and angle filter
//! - Measuring per-stage durations on robot hardware
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin linetrack-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use linetrack_pipeline::diagnostics::PipelineDiagnostics;
use linetrack_pipeline::{
    AngleRange, Frame, Interpolation, LinePipeline, PipelineConfig, SegmentSet,
};

/// Pipeline parameter experimentation and diagnostics for linetrack.
///
/// Runs the line pipeline on a given image with configurable parameters
/// and prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "linetrack-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Resize factor applied on both axes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SCALE)]
    scale: f64,

    /// Resampling method for the resize stage.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_INTERPOLATION)]
    interpolation: Resample,

    /// Threshold cutoff; pixels strictly above it are kept.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Output level for kept pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD_MAX)]
    threshold_max: f64,

    /// Number of 3x3 erosion passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ERODE_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    erode_iterations: u32,

    /// Minimum segment length in resized pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_LENGTH)]
    min_length: f64,

    /// Lower bound of the accepted angle range (degrees).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ANGLE_LO, allow_negative_numbers = true)]
    angle_lo: f64,

    /// Upper bound of the accepted angle range (degrees).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ANGLE_HI, allow_negative_numbers = true)]
    angle_hi: f64,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Write the resized frame with the filtered segments drawn on it.
    #[arg(long, value_name = "PNG")]
    annotate: Option<PathBuf>,
}

/// Resize interpolation selection.
#[derive(Clone, Copy, ValueEnum)]
enum Resample {
    /// Nearest neighbor.
    Nearest,
    /// Bilinear.
    Linear,
    /// Bicubic.
    Cubic,
    /// Pixel-area averaging.
    Area,
    /// Lanczos, 3 lobes.
    Lanczos,
}

/// Maps an [`Interpolation`] to the local CLI [`Resample`] enum.
const fn resample_from_pipeline(i: Interpolation) -> Resample {
    match i {
        Interpolation::Nearest => Resample::Nearest,
        Interpolation::Linear => Resample::Linear,
        Interpolation::Cubic => Resample::Cubic,
        Interpolation::Area => Resample::Area,
        Interpolation::Lanczos => Resample::Lanczos,
    }
}

/// The CLI default interpolation, derived from the pipeline default so
/// the two cannot silently diverge.
const CLI_DEFAULT_INTERPOLATION: Resample =
    resample_from_pipeline(PipelineConfig::DEFAULT_INTERPOLATION);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            scale_x: cli.scale,
            scale_y: cli.scale,
            interpolation: match cli.interpolation {
                Resample::Nearest => Interpolation::Nearest,
                Resample::Linear => Interpolation::Linear,
                Resample::Cubic => Interpolation::Cubic,
                Resample::Area => Interpolation::Area,
                Resample::Lanczos => Interpolation::Lanczos,
            },
            threshold: cli.threshold,
            threshold_max: cli.threshold_max,
            erode_iterations: cli.erode_iterations,
            min_length: cli.min_length,
            angle_range: AngleRange::new(cli.angle_lo, cli.angle_hi)
                .map_err(|e| format!("Error in angle range: {e}"))?,
            ..PipelineConfig::default()
        }
    };
    config
        .validate()
        .map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

fn load_frame(path: &Path) -> Result<Frame, String> {
    let decoded =
        image::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    Frame::from_dynamic(&decoded).map_err(|e| format!("Unsupported image {}: {e}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let frame = match load_frame(&cli.image_path) {
        Ok(frame) => frame,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        path = %cli.image_path.display(),
        width = frame.width(),
        height = frame.height(),
        channels = frame.channels(),
        runs = cli.runs,
        "loaded image"
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let mut pipeline = LinePipeline::new(config);
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let diagnostics = match pipeline.process_with_diagnostics(&frame) {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        // Segments and the annotated frame only on the first run.
        if run == 0 {
            if !cli.json
                && let Some(filtered) = pipeline.filtered()
            {
                print_segments(filtered);
            }
            if let Some(ref out_path) = cli.annotate {
                if let Err(msg) = write_annotated(&pipeline, out_path) {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
                eprintln!("Annotated frame written to {}", out_path.display());
            }
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn print_segments(segments: &SegmentSet) {
    println!();
    println!(
        "{:>4} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8}",
        "#", "x1", "y1", "x2", "y2", "length", "angle"
    );
    for (i, s) in segments.iter().enumerate() {
        println!(
            "{i:>4} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>8.2} {:>8.2}",
            s.x1,
            s.y1,
            s.x2,
            s.y2,
            s.length(),
            s.angle(),
        );
    }
}

/// Draw the filtered segments in red over the resized frame and save it.
#[allow(clippy::cast_possible_truncation)]
fn write_annotated(pipeline: &LinePipeline, path: &Path) -> Result<(), String> {
    let (Some(resized), Some(segments)) = (pipeline.resized(), pipeline.filtered()) else {
        return Err("Nothing to annotate: pipeline has not completed a run".to_owned());
    };
    let mut canvas = resized.to_dynamic().to_rgb8();
    for s in segments {
        imageproc::drawing::draw_line_segment_mut(
            &mut canvas,
            (s.x1 as f32, s.y1 as f32),
            (s.x2 as f32, s.y2 as f32),
            image::Rgb([255, 0, 0]),
        );
    }
    canvas
        .save(path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> std::time::Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Resize", |d| d.resize.duration),
        ("Desaturate", |d| d.desaturate.duration),
        ("Threshold", |d| d.threshold.duration),
        ("Erode", |d| d.erode.duration),
        ("Detect", |d| d.detect.duration),
        ("Filter", |d| d.filter.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
