//! Fundus normalizer
//!
//! One pure pipeline (`FundusNormalizer::normalize`) turns a decoded
//! photograph into a square, centered fundus image. The path and byte
//! entry points are thin adapters around it.

use crate::{
    config::{NormalizerConfig, OutputFormat},
    error::Result,
    localize::{locate_fundus, LocalizationFailure},
    services::ImageIOService,
    types::{FundusRegion, NormalizationMetadata, NormalizationTimings, NormalizedImage},
    utils::{ImagePreprocessor, PreprocessingOptions},
};
use image::{imageops, DynamicImage};
use instant::Instant;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Locates, crops and re-centers fundus photographs
///
/// Holds only read-only configuration, so a single instance can be shared
/// across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FundusNormalizer {
    config: NormalizerConfig,
}

impl Default for FundusNormalizer {
    fn default() -> Self {
        Self {
            config: NormalizerConfig::default(),
        }
    }
}

impl FundusNormalizer {
    /// Create a normalizer from a validated configuration
    ///
    /// # Errors
    /// Returns `FundusError::InvalidConfig` if the configuration is out of range.
    pub fn new(config: NormalizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Default configuration with a specific output diameter
    ///
    /// # Errors
    /// Returns `FundusError::InvalidConfig` for a zero or oversized diameter.
    pub fn with_diameter(diameter: u32) -> Result<Self> {
        Self::new(NormalizerConfig::with_diameter(diameter))
    }

    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Locate the fundus region without transforming the image
    ///
    /// # Errors
    /// Returns the reason localization failed.
    pub fn locate(&self, image: &DynamicImage) -> std::result::Result<FundusRegion, LocalizationFailure> {
        locate_fundus(image, &self.config)
    }

    /// Normalize a decoded photograph
    ///
    /// Returns `None` when no fundus region can be located: uniform, black or
    /// low-contrast images, or a largest bright region below the minimum area.
    ///
    /// # Examples
    /// ```rust
    /// use fundus_norm::FundusNormalizer;
    /// use image::{DynamicImage, RgbImage};
    ///
    /// let normalizer = FundusNormalizer::default();
    /// let black = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
    /// assert!(normalizer.normalize(&black).is_none());
    /// ```
    #[instrument(
        skip_all,
        fields(width = image.width(), height = image.height(), diameter = self.config.diameter)
    )]
    pub fn normalize(&self, image: &DynamicImage) -> Option<NormalizedImage> {
        let start = Instant::now();

        let region = match self.locate(image) {
            Ok(region) => region,
            Err(reason) => {
                debug!(%reason, "No fundus region located");
                return None;
            },
        };
        let localize_ms = start.elapsed().as_millis() as u64;

        let transform_start = Instant::now();
        let rgb = image.to_rgb8();
        let crop = imageops::crop_imm(&rgb, region.x, region.y, region.width, region.height).to_image();

        let anchor = (
            region.centroid.0 - f64::from(region.x),
            region.centroid.1 - f64::from(region.y),
        );
        let options = PreprocessingOptions {
            padding_color: self.config.padding_color,
            filter: self.config.filter,
        };
        let (canvas, placement) =
            ImagePreprocessor::letterbox(&crop, self.config.diameter, anchor, &options);

        let timings = NormalizationTimings {
            localize_ms,
            transform_ms: transform_start.elapsed().as_millis() as u64,
            total_ms: start.elapsed().as_millis() as u64,
        };

        debug!(
            radius = region.radius(),
            already_cropped = region.covers_frame(image.width(), image.height()),
            scale = placement.scale,
            resized_width = placement.resized.0,
            resized_height = placement.resized.1,
            offset_x = placement.offset.0,
            offset_y = placement.offset.1,
            total_ms = timings.total_ms,
            "Normalized fundus"
        );

        Some(NormalizedImage::new(
            canvas,
            NormalizationMetadata {
                source_dimensions: (image.width(), image.height()),
                region,
                scale: placement.scale,
                resized_dimensions: placement.resized,
                offset: placement.offset,
                timings,
            },
        ))
    }

    /// Decode and normalize an encoded image
    ///
    /// # Errors
    /// Returns `FundusError::Decode` if the bytes are not a supported raster image.
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<Option<NormalizedImage>> {
        let image = ImageIOService::load_from_bytes(bytes)?;
        Ok(self.normalize(&image))
    }

    /// Normalize the image at `source` and write it to `destination`
    ///
    /// `destination` may equal `source`. The output format follows the
    /// destination extension, falling back to the configured format.
    ///
    /// Returns `Ok(false)` without touching `destination` when no fundus is
    /// found.
    ///
    /// # Errors
    /// - `FundusError::Io` if the source cannot be read or the destination written
    /// - `FundusError::Decode` if the source is not a supported raster image
    /// - `FundusError::UnsupportedFormat` if the output codec is unavailable
    #[instrument(skip(self, source, destination), fields(source = %source.as_ref().display()))]
    pub fn normalize_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, destination: Q) -> Result<bool> {
        let destination = destination.as_ref();
        let image = ImageIOService::load_image(source.as_ref())?;

        let Some(normalized) = self.normalize(&image) else {
            info!("No fundus region found, destination left unchanged");
            return Ok(false);
        };

        let format = OutputFormat::from_path(destination).unwrap_or(self.config.output_format);
        normalized.save(destination, format, self.config.jpeg_quality)?;
        debug!(destination = %destination.display(), %format, "Saved normalized fundus");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FundusError;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn disk_on_black(width: u32, height: u32, cx: f64, cy: f64, radius: f64) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                Rgb([190, 90, 40])
            } else {
                Rgb([3, 2, 2])
            }
        }))
    }

    #[test]
    fn test_normalize_produces_square_output() {
        let normalizer = FundusNormalizer::with_diameter(128).unwrap();
        let image = disk_on_black(320, 240, 160.0, 120.0, 100.0);

        let normalized = normalizer.normalize(&image).unwrap();
        assert_eq!(normalized.diameter(), 128);
        assert_eq!(normalized.to_array().shape(), &[128, 128, 3]);

        let metadata = normalized.metadata();
        assert_eq!(metadata.source_dimensions, (320, 240));
        assert_eq!(metadata.resized_dimensions, (128, 128));
        assert_eq!(metadata.offset, (0, 0));
    }

    #[test]
    fn test_normalize_rejects_black() {
        let normalizer = FundusNormalizer::default();
        let black = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
        assert!(normalizer.normalize(&black).is_none());
    }

    #[test]
    fn test_zero_diameter_is_invalid_config() {
        assert!(matches!(
            FundusNormalizer::with_diameter(0),
            Err(FundusError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_corners_stay_dark_and_center_keeps_color() {
        let normalizer = FundusNormalizer::with_diameter(100).unwrap();
        let image = disk_on_black(300, 300, 150.0, 150.0, 120.0);
        let normalized = normalizer.normalize(&image).unwrap();

        let close = |a: [u8; 3], b: [u8; 3]| a.iter().zip(b).all(|(x, y)| x.abs_diff(y) <= 2);
        assert!(close(normalized.image().get_pixel(0, 0).0, [3, 2, 2]));
        assert!(close(normalized.image().get_pixel(50, 50).0, [190, 90, 40]));
    }

    #[test]
    fn test_normalize_bytes_distinguishes_decode_failure() {
        let normalizer = FundusNormalizer::default();
        assert!(matches!(
            normalizer.normalize_bytes(b"not an image"),
            Err(FundusError::Decode(_))
        ));

        let black = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let bytes = ImageIOService::encode(&black, OutputFormat::Png, 90).unwrap();
        assert!(normalizer.normalize_bytes(&bytes).unwrap().is_none());
    }

    #[test]
    fn test_normalize_file_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fundus.png");
        disk_on_black(400, 300, 200.0, 150.0, 140.0).save(&path).unwrap();

        let normalizer = FundusNormalizer::default();
        assert!(normalizer.normalize_file(&path, &path).unwrap());

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (299, 299));
    }

    #[test]
    fn test_normalize_file_without_fundus_leaves_destination() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("black.png");
        let destination = temp_dir.path().join("out.png");
        DynamicImage::ImageRgb8(RgbImage::new(50, 50)).save(&source).unwrap();

        let normalizer = FundusNormalizer::default();
        assert!(!normalizer.normalize_file(&source, &destination).unwrap());
        assert!(!destination.exists());
    }
}
