#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! # Fundus Normalization Library
//!
//! Locates the circular fundus (retina) disk in an arbitrarily framed color
//! photograph, crops to it and re-centers it on a square canvas of fixed
//! diameter, ready for a downstream classifier.
//!
//! ## Features
//!
//! - **Robust localization**: luminance thresholding (Otsu with a floor, or a
//!   fixed cutoff) followed by largest-connected-component extraction
//! - **Clipped disks**: the disk centroid, not the bounding box, is placed at
//!   the canvas center, so disks cut off by the camera frame stay centered
//! - **Idempotent**: normalizing a normalized image leaves it unchanged
//! - **Format Support**: JPEG, PNG, TIFF, BMP and WebP input and output
//! - **Batch Processing**: bounded-concurrency batch driver with JSON reports
//! - **Classifier Handoff**: `(N, d, d, 3)` batches via `ndarray`
//! - **CLI Integration**: optional `fundus-norm` command (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fundus_norm::{FundusNormalizer, NormalizerConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let normalizer = FundusNormalizer::new(NormalizerConfig::with_diameter(512))?;
//! if normalizer.normalize_file("scan.jpg", "scan_normalized.png")? {
//!     println!("normalized");
//! } else {
//!     println!("no fundus found");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and tracing setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log file output
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! fundus-norm = { version = "0.1", default-features = false }
//! ```

pub mod batch;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod localize;
pub mod normalizer;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use image::DynamicImage;
use std::path::Path;
use tokio::io::AsyncRead;

// Public API exports
pub use batch::{BatchItemResult, BatchItemStatus, BatchJob, BatchNormalizer, BatchSummary};
pub use classifier::{classify, stack_batch, Classifier, MockClassifier};
pub use config::{
    NormalizerConfig, NormalizerConfigBuilder, OutputFormat, ResizeFilter, ThresholdMethod,
    DEFAULT_DIAMETER,
};
pub use error::{FundusError, Result};
pub use localize::{locate_fundus, LocalizationFailure};
pub use normalizer::FundusNormalizer;
pub use services::{
    BatchProcessingStats, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter,
    ProgressReporter,
};
pub use types::{FundusRegion, NormalizationMetadata, NormalizationTimings, NormalizedImage};
pub use utils::{ImagePreprocessor, PreprocessingOptions};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, init_cli_tracing, spans, TracingConfig, TracingFormat,
    TracingOutput,
};

/// Normalize the image at `source` and write it to `destination`
///
/// Uses the default configuration (diameter 299). Returns `true` once the
/// normalized image is written. Returns `false` when the source cannot be
/// decoded, contains no plausible fundus, or the write fails; `destination`
/// is then absent or unchanged. `destination` may equal `source`.
///
/// Use [`FundusNormalizer::normalize_file`] to tell those cases apart.
///
/// # Examples
/// ```rust,no_run
/// if !fundus_norm::normalize_from_path("raw/eye.jpg", "normalized/eye.jpg") {
///     eprintln!("skipping eye.jpg");
/// }
/// ```
pub fn normalize_from_path<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> bool {
    let source = source.as_ref();
    match FundusNormalizer::default().normalize_file(source, destination) {
        Ok(written) => written,
        Err(e) => {
            tracing::warn!(source = %source.display(), error = %e, "Normalization failed");
            false
        },
    }
}

/// Normalize a decoded image to `diameter × diameter`
///
/// Returns `Ok(None)` when no fundus region can be located.
///
/// # Errors
/// Returns `FundusError::InvalidConfig` for a zero or oversized diameter.
///
/// # Examples
/// ```rust
/// use fundus_norm::normalize_in_memory;
/// use image::{DynamicImage, Rgb, RgbImage};
///
/// let photo = DynamicImage::ImageRgb8(RgbImage::from_fn(320, 240, |x, y| {
///     let (dx, dy) = (x as f64 - 160.0, y as f64 - 120.0);
///     if dx * dx + dy * dy < 100.0 * 100.0 { Rgb([180, 80, 40]) } else { Rgb([0, 0, 0]) }
/// }));
///
/// let normalized = normalize_in_memory(&photo, 128).unwrap().unwrap();
/// assert_eq!(normalized.to_array().shape(), &[128, 128, 3]);
/// ```
pub fn normalize_in_memory(image: &DynamicImage, diameter: u32) -> Result<Option<NormalizedImage>> {
    let normalizer = FundusNormalizer::with_diameter(diameter)?;
    Ok(normalizer.normalize(image))
}

/// Normalize an encoded image held in memory
///
/// # Errors
/// - `FundusError::InvalidConfig` if `config` is out of range
/// - `FundusError::Decode` if the bytes are not a supported raster image
pub fn normalize_from_bytes(bytes: &[u8], config: &NormalizerConfig) -> Result<Option<NormalizedImage>> {
    FundusNormalizer::new(config.clone())?.normalize_bytes(bytes)
}

/// Normalize an image read from an async stream
///
/// # Errors
/// - `FundusError::InvalidConfig` if `config` is out of range
/// - `FundusError::Io` if reading the stream fails
/// - `FundusError::Decode` if the data is not a supported raster image
///
/// # Examples
/// ```rust,no_run
/// use fundus_norm::{normalize_from_reader, NormalizerConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("scan.png").await?;
/// let normalized = normalize_from_reader(file, &NormalizerConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn normalize_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &NormalizerConfig,
) -> Result<Option<NormalizedImage>> {
    let normalizer = FundusNormalizer::new(config.clone())?;
    let image = ImageIOService::load_from_reader(reader).await?;
    Ok(normalizer.normalize(&image))
}
