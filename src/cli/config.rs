//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat, CliResizeFilter};
use crate::config::{NormalizerConfig, NormalizerConfigBuilder, OutputFormat, ResizeFilter};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated `NormalizerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply explicit flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<NormalizerConfig> {
        let base = match &cli.config {
            Some(path) => NormalizerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => NormalizerConfig::default(),
        };

        let mut builder = NormalizerConfigBuilder::from(base);
        if let Some(diameter) = cli.diameter {
            builder = builder.diameter(diameter);
        }
        if let Some(threshold) = cli.threshold {
            builder = builder.fixed_threshold(threshold);
        }
        if let Some(fraction) = cli.min_area_fraction {
            builder = builder.min_area_fraction(fraction);
        }
        if let Some(filter) = cli.filter {
            builder = builder.filter(filter.into());
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }

        builder.build().context("Invalid normalization settings")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.in_place && cli.output.is_some() {
            anyhow::bail!("--in-place cannot be combined with --output");
        }
        if cli.in_place && cli.format.is_some() {
            anyhow::bail!("--in-place keeps the source format; drop --format");
        }
        if cli.jobs == Some(0) {
            anyhow::bail!("--jobs must be at least 1");
        }
        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern: {pattern}"))?;
        }
        Ok(())
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Tiff => Self::Tiff,
            CliOutputFormat::Bmp => Self::Bmp,
            #[cfg(feature = "webp-support")]
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

impl From<CliResizeFilter> for ResizeFilter {
    fn from(filter: CliResizeFilter) -> Self {
        match filter {
            CliResizeFilter::Nearest => Self::Nearest,
            CliResizeFilter::Triangle => Self::Triangle,
            CliResizeFilter::CatmullRom => Self::CatmullRom,
            CliResizeFilter::Gaussian => Self::Gaussian,
            CliResizeFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdMethod;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fundus-norm").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = CliConfigBuilder::from_cli(&parse(&["eye.jpg"])).unwrap();
        assert_eq!(config, NormalizerConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "eye.jpg",
            "-d",
            "512",
            "--threshold",
            "30",
            "--min-area-fraction",
            "0.2",
            "--filter",
            "lanczos3",
            "-f",
            "jpeg",
            "--jpeg-quality",
            "80",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.diameter, 512);
        assert_eq!(config.threshold, ThresholdMethod::Fixed { value: 30 });
        assert!((config.min_area_fraction - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.filter, ResizeFilter::Lanczos3);
        assert_eq!(config.output_format, OutputFormat::Jpeg);
        assert_eq!(config.jpeg_quality, 80);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("norm.json");
        std::fs::write(&path, r#"{ "diameter": 128, "min_contrast": 40 }"#).unwrap();

        let config_arg = path.to_string_lossy().to_string();
        let config = CliConfigBuilder::from_cli(&parse(&["eye.jpg", "--config", &config_arg])).unwrap();
        assert_eq!(config.diameter, 128);
        assert_eq!(config.min_contrast, 40);

        let config =
            CliConfigBuilder::from_cli(&parse(&["eye.jpg", "--config", &config_arg, "-d", "64"])).unwrap();
        assert_eq!(config.diameter, 64);
        assert_eq!(config.min_contrast, 40);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(CliConfigBuilder::from_cli(&parse(&["eye.jpg", "-d", "0"])).is_err());
        assert!(CliConfigBuilder::from_cli(&parse(&["eye.jpg", "--min-area-fraction", "1.5"])).is_err());
        assert!(Cli::try_parse_from(["fundus-norm", "eye.jpg", "--jpeg-quality", "0"]).is_err());
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["eye.jpg"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["eye.jpg", "--in-place", "-o", "x.png"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["eye.jpg", "--in-place", "-f", "png"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["eye.jpg", "-j", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["dir", "--pattern", "[*.png"])).is_err());
    }
}
