//! Fundus normalization CLI tool
//!
//! Command-line batch driver around `BatchNormalizer`.

use super::config::CliConfigBuilder;
use crate::{
    batch::{BatchItemResult, BatchItemStatus, BatchJob, BatchNormalizer, BatchSummary},
    config::OutputFormat,
    normalizer::FundusNormalizer,
    services::{BatchProcessingStats, ConsoleProgressReporter, ImageIOService, ProgressReporter},
    tracing_config::{events, init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

const NORMALIZED_SUFFIX: &str = "_normalized";

/// Fundus photograph normalization tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "fundus-norm")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Output file (single input) or directory (batch processing)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Overwrite each input with its normalized version
    #[arg(long)]
    pub in_place: bool,

    /// Output diameter in pixels [default: 299]
    #[arg(short, long)]
    pub diameter: Option<u32>,

    /// Fixed luminance cutoff (0-255) instead of automatic thresholding
    #[arg(long, value_name = "LEVEL")]
    pub threshold: Option<u8>,

    /// Minimum fundus area as a fraction of the image [default: 0.05]
    #[arg(long, value_name = "FRACTION")]
    pub min_area_fraction: Option<f32>,

    /// Resampling filter [default: triangle]
    #[arg(long, value_enum)]
    pub filter: Option<CliResizeFilter>,

    /// Output format [default: same as input]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (1-100) [default: 95]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Load normalization settings from a JSON file; flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of images processed concurrently [default: CPU count]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write a JSON report of the batch
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
    #[cfg(feature = "webp-support")]
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (session_id, _tracing_guard) =
        init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let summary = run(&cli).instrument(spans::session(&session_id)).await?;

    if summary.normalized == 0 {
        anyhow::bail!(
            "No fundus was normalized ({} input(s): {} without a detectable fundus, {} failed)",
            summary.total,
            summary.no_fundus,
            summary.failed
        );
    }
    Ok(())
}

/// Normalize every input named on the command line
pub async fn run(cli: &Cli) -> Result<BatchSummary> {
    CliConfigBuilder::validate_cli(cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(cli).context("Failed to build configuration")?;
    debug!(?config, "Resolved configuration");

    let inputs = collect_inputs(cli)?;
    if inputs.files.is_empty() {
        anyhow::bail!("No supported images found in the provided inputs");
    }
    info!("Found {} image(s) to normalize", inputs.files.len());

    let explicit_format = cli.format.map(OutputFormat::from);
    let jobs = plan_jobs(cli, &inputs, explicit_format, config.output_format)?;

    let normalizer = FundusNormalizer::new(config).context("Failed to create normalizer")?;
    let reporter: Arc<dyn ProgressReporter> = if jobs.len() > 1 {
        Arc::new(IndicatifProgressReporter::new(jobs.len())?)
    } else {
        Arc::new(ConsoleProgressReporter::new(cli.verbose > 0))
    };

    let mut batch = BatchNormalizer::new(normalizer).with_reporter(reporter);
    if let Some(concurrency) = cli.jobs {
        batch = batch.with_concurrency(concurrency);
    }

    let span = spans::batch_processing(jobs.len(), batch.concurrency());
    let summary = batch.run(jobs).instrument(span).await;

    if let Some(report) = &cli.report {
        summary
            .write_json(report)
            .with_context(|| format!("Failed to write report to {}", report.display()))?;
        info!("Report written to {}", report.display());
    }

    log_summary(&summary);
    Ok(summary)
}

/// Files discovered from the command line inputs
#[derive(Debug, Default)]
pub(crate) struct CollectedInputs {
    pub files: Vec<InputFile>,
    /// Whether any input named a directory
    pub from_directory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InputFile {
    pub path: PathBuf,
    /// Path below the directory input it came from (file name for file inputs)
    pub relative: PathBuf,
}

fn collect_inputs(cli: &Cli) -> Result<CollectedInputs> {
    // Outputs written next to their inputs would be picked up again on a rerun
    let skip_generated = cli.output.is_none() && !cli.in_place;
    let mut collected = CollectedInputs::default();

    for path in &cli.input {
        if path.is_file() {
            if is_image_file(path) {
                let relative = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
                collected.files.push(InputFile {
                    path: path.clone(),
                    relative,
                });
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            collected.from_directory = true;
            for file in find_image_files(path, cli.recursive, cli.pattern.as_deref(), skip_generated)? {
                let relative = file.strip_prefix(path).map(Path::to_path_buf).unwrap_or_else(|_| file.clone());
                collected.files.push(InputFile {
                    path: file,
                    relative,
                });
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    collected.files.sort_by(|a, b| a.path.cmp(&b.path));
    collected.files.dedup_by(|a, b| a.path == b.path);
    Ok(collected)
}

/// Find image files in a directory
fn find_image_files(
    dir: &Path,
    recursive: bool,
    pattern: Option<&str>,
    skip_generated: bool,
) -> Result<Vec<PathBuf>> {
    let accept = |path: &Path| {
        is_image_file(path)
            && matches_pattern(path, pattern)
            && !(skip_generated && is_generated_output(path))
    };

    let mut files = Vec::new();
    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() && accept(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && accept(&path) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path) -> bool {
    ImageIOService::is_supported_format(path)
}

fn is_generated_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(NORMALIZED_SUFFIX))
}

/// Check if file name matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

/// Format used for a generated output name
fn output_format_for(input: &Path, explicit: Option<OutputFormat>, fallback: OutputFormat) -> OutputFormat {
    explicit
        .or_else(|| OutputFormat::from_path(input))
        .unwrap_or(fallback)
}

/// `<stem>_normalized.<ext>` next to the input
fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    input.with_file_name(format!(
        "{}{}.{}",
        stem.to_string_lossy(),
        NORMALIZED_SUFFIX,
        format.extension()
    ))
}

/// Same relative path below `output_dir`, extension matching `format`
fn output_path_in_dir(input: &InputFile, output_dir: &Path, format: OutputFormat) -> PathBuf {
    output_dir
        .join(&input.relative)
        .with_extension(format.extension())
}

fn plan_jobs(
    cli: &Cli,
    inputs: &CollectedInputs,
    explicit_format: Option<OutputFormat>,
    fallback_format: OutputFormat,
) -> Result<Vec<BatchJob>> {
    if cli.in_place {
        return Ok(inputs
            .files
            .iter()
            .map(|input| BatchJob::in_place(input.path.clone()))
            .collect());
    }

    let Some(output) = &cli.output else {
        return Ok(inputs
            .files
            .iter()
            .map(|input| {
                let format = output_format_for(&input.path, explicit_format, fallback_format);
                BatchJob::new(input.path.clone(), default_output_path(&input.path, format))
            })
            .collect());
    };

    let single_target = inputs.files.len() == 1 && !inputs.from_directory && !output.is_dir();
    if single_target {
        return Ok(inputs
            .files
            .iter()
            .map(|input| BatchJob::new(input.path.clone(), output.clone()))
            .collect());
    }

    if output.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output.display()
        );
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    Ok(inputs
        .files
        .iter()
        .map(|input| {
            let format = output_format_for(&input.path, explicit_format, fallback_format);
            BatchJob::new(input.path.clone(), output_path_in_dir(input, output, format))
        })
        .collect())
}

fn log_summary(summary: &BatchSummary) {
    events::performance_metric("batch", summary.duration_ms);

    if summary.no_fundus > 0 {
        events::warning_with_recommendation(
            &format!("{} image(s) had no detectable fundus", summary.no_fundus),
            "check exposure, or lower --threshold / --min-area-fraction",
        );
    }
    if summary.total > 1 {
        let seconds = summary.duration_ms as f64 / 1000.0;
        info!("Batch summary:");
        info!("  ├─ Normalized: {}", summary.normalized);
        info!("  ├─ No fundus: {}", summary.no_fundus);
        info!("  ├─ Failed: {}", summary.failed);
        info!("  ├─ Total time: {:.2}s", seconds);
        info!(
            "  └─ Average per file: {:.2}s",
            seconds / summary.total.max(1) as f64
        );
    } else if let Some(item) = summary.items.first() {
        info!(
            "{} -> {} ({}, {}ms)",
            item.source.display(),
            item.destination.display(),
            item.status,
            item.duration_ms
        );
    }
}

/// Progress bar for multi-file runs
struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_item(&self, item: &BatchItemResult, stats: &BatchProcessingStats) {
        if let BatchItemStatus::Failed(ref error) = item.status {
            self.bar
                .println(format!("Failed {}: {error}", item.source.display()));
        }
        self.bar.set_message(format!(
            "{} normalized, {} no fundus, {} failed",
            stats.items_normalized, stats.items_skipped, stats.items_failed
        ));
        self.bar.inc(1);
    }

    fn report_completion(&self, summary: &BatchSummary) {
        self.bar.finish_with_message(format!(
            "Completed! Normalized: {}, No fundus: {}, Failed: {}",
            summary.normalized, summary.no_fundus, summary.failed
        ));
    }
}
