//! Configuration types for fundus normalization

use crate::error::{FundusError, Result};
use image::{imageops::FilterType, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input resolution of the `InceptionV3` classifier the normalizer was built for
pub const DEFAULT_DIAMETER: u32 = 299;

/// Upper bound on the output side length
pub const MAX_DIAMETER: u32 = 16_384;

/// Foreground/background separation method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Fixed luminance cutoff; pixels strictly brighter are foreground
    Fixed { value: u8 },
    /// Cutoff between the two Otsu class means
    ///
    /// `bias` is the position between the background mean (0.0) and the
    /// foreground mean (1.0). The cutoff never drops below `floor`.
    Otsu { floor: u8, bias: f32 },
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        Self::Otsu {
            floor: 10,
            bias: 0.35,
        }
    }
}

impl std::fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed { value } => write!(f, "fixed({value})"),
            Self::Otsu { floor, bias } => write!(f, "otsu(floor={floor}, bias={bias})"),
        }
    }
}

/// Resampling filter used when scaling the fundus crop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    #[must_use]
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Output image format options for path-based normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Tiff,
    Bmp,
    /// Lossless WebP (requires the `webp-support` feature)
    WebP,
}

impl OutputFormat {
    /// Get the appropriate file extension (without the dot)
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::WebP => "webp",
        }
    }

    #[must_use]
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Tiff => ImageFormat::Tiff,
            Self::Bmp => ImageFormat::Bmp,
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// Infer the format from a path's extension
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
            Self::WebP => "WebP",
        };
        f.write_str(name)
    }
}

/// Configuration for fundus normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Side length of the square output in pixels
    pub diameter: u32,

    /// Foreground/background separation method
    pub threshold: ThresholdMethod,

    /// Minimum spread between the 1st and 99th luminance percentiles, and
    /// minimum gap between the background and foreground class means
    pub min_contrast: u8,

    /// Minimum gap between the background and foreground class means, in
    /// units of the background standard deviation (floored at one level)
    pub min_separation: f32,

    /// Minimum fundus area as a fraction of the analyzed pixels, in (0, 1]
    pub min_area_fraction: f32,

    /// Absolute minimum fundus area in analyzed pixels
    pub min_area_pixels: u32,

    /// Longest side of the luminance copy used for localization
    pub analysis_max_dimension: u32,

    /// Canvas fill for area outside the fundus crop (RGB)
    pub padding_color: [u8; 3],

    /// Resampling filter for the crop
    pub filter: ResizeFilter,

    /// Format used when a destination path has no recognizable extension
    pub output_format: OutputFormat,

    /// JPEG quality (1-100, only used for JPEG output)
    pub jpeg_quality: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            diameter: DEFAULT_DIAMETER,
            threshold: ThresholdMethod::default(),
            min_contrast: 24,
            min_separation: 4.0,
            min_area_fraction: 0.05,
            min_area_pixels: 64,
            analysis_max_dimension: 1024,
            padding_color: [0, 0, 0],
            filter: ResizeFilter::default(),
            output_format: OutputFormat::default(),
            jpeg_quality: 95,
        }
    }
}

impl NormalizerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use fundus_norm::{NormalizerConfig, ResizeFilter};
    ///
    /// let config = NormalizerConfig::builder()
    ///     .diameter(512)
    ///     .filter(ResizeFilter::Lanczos3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.diameter, 512);
    /// ```
    #[must_use]
    pub fn builder() -> NormalizerConfigBuilder {
        NormalizerConfigBuilder::default()
    }

    /// Default configuration with a different output diameter
    #[must_use]
    pub fn with_diameter(diameter: u32) -> Self {
        Self {
            diameter,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - The file cannot be read
    /// - The JSON is malformed or fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| FundusError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            FundusError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Diameter: 1-16384
    /// - Minimum area fraction: (0, 1]
    /// - Otsu bias: (0, 1)
    /// - Minimum separation: finite and >= 0
    /// - Analysis dimension: at least 64
    /// - JPEG quality: 1-100
    ///
    /// # Errors
    /// Returns `FundusError::InvalidConfig` naming the offending parameter.
    ///
    /// # Examples
    /// ```rust
    /// use fundus_norm::NormalizerConfig;
    ///
    /// let mut config = NormalizerConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.diameter = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.diameter == 0 || self.diameter > MAX_DIAMETER {
            return Err(FundusError::config_value_error(
                "diameter",
                self.diameter,
                "1-16384",
                Some(DEFAULT_DIAMETER),
            ));
        }

        if !(self.min_area_fraction > 0.0 && self.min_area_fraction <= 1.0) {
            return Err(FundusError::config_value_error(
                "minimum area fraction",
                self.min_area_fraction,
                "(0, 1]",
                Some(0.05),
            ));
        }

        if let ThresholdMethod::Otsu { bias, .. } = self.threshold {
            if !(bias > 0.0 && bias < 1.0) {
                return Err(FundusError::config_value_error(
                    "Otsu bias",
                    bias,
                    "(0, 1)",
                    Some(0.35),
                ));
            }
        }

        if !(self.min_separation.is_finite() && self.min_separation >= 0.0) {
            return Err(FundusError::config_value_error(
                "minimum separation",
                self.min_separation,
                ">= 0",
                Some(4.0),
            ));
        }

        if self.analysis_max_dimension < 64 {
            return Err(FundusError::config_value_error(
                "analysis max dimension",
                self.analysis_max_dimension,
                ">= 64",
                Some(1024),
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(FundusError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(95),
            ));
        }

        Ok(())
    }
}

/// Builder for `NormalizerConfig`
#[derive(Debug, Default)]
pub struct NormalizerConfigBuilder {
    config: NormalizerConfig,
}

impl From<NormalizerConfig> for NormalizerConfigBuilder {
    fn from(config: NormalizerConfig) -> Self {
        Self { config }
    }
}

impl NormalizerConfigBuilder {
    #[must_use]
    pub fn diameter(mut self, diameter: u32) -> Self {
        self.config.diameter = diameter;
        self
    }

    #[must_use]
    pub fn threshold(mut self, threshold: ThresholdMethod) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Use a fixed luminance cutoff instead of Otsu
    #[must_use]
    pub fn fixed_threshold(mut self, value: u8) -> Self {
        self.config.threshold = ThresholdMethod::Fixed { value };
        self
    }

    #[must_use]
    pub fn min_contrast(mut self, min_contrast: u8) -> Self {
        self.config.min_contrast = min_contrast;
        self
    }

    #[must_use]
    pub fn min_separation(mut self, separation: f32) -> Self {
        self.config.min_separation = separation;
        self
    }

    #[must_use]
    pub fn min_area_fraction(mut self, fraction: f32) -> Self {
        self.config.min_area_fraction = fraction;
        self
    }

    #[must_use]
    pub fn min_area_pixels(mut self, pixels: u32) -> Self {
        self.config.min_area_pixels = pixels;
        self
    }

    #[must_use]
    pub fn analysis_max_dimension(mut self, dimension: u32) -> Self {
        self.config.analysis_max_dimension = dimension;
        self
    }

    #[must_use]
    pub fn padding_color(mut self, color: [u8; 3]) -> Self {
        self.config.padding_color = color;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: ResizeFilter) -> Self {
        self.config.filter = filter;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `FundusError::InvalidConfig` if any parameter is out of range.
    pub fn build(self) -> Result<NormalizerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
