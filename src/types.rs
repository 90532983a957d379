//! Core types for fundus normalization

use crate::{config::OutputFormat, error::Result, services::ImageIOService};
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bounding geometry of the fundus disk in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundusRegion {
    /// Left edge of the bounding box
    pub x: u32,
    /// Top edge of the bounding box
    pub y: u32,
    /// Bounding box width
    pub width: u32,
    /// Bounding box height
    pub height: u32,
    /// Foreground pixel count of the selected component
    pub area: u64,
    /// Foreground centroid (pixel centers, continuous coordinates)
    pub centroid: (f64, f64),
    /// Luminance cutoff that separated the disk from the background
    pub threshold: u8,
}

impl FundusRegion {
    /// Disk radius estimate
    ///
    /// Uses the larger bounding extent, which stays a full diameter when the
    /// camera frame clips the disk along the other axis.
    #[must_use]
    pub fn radius(&self) -> f64 {
        f64::from(self.width.max(self.height)) / 2.0
    }

    /// Width over height of the bounding box
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }

    /// Whether the region spans the whole `width × height` frame
    #[must_use]
    pub fn covers_frame(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }
}

/// Timing breakdown for a single normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationTimings {
    /// Luminance conversion, thresholding and component labeling
    pub localize_ms: u64,
    /// Crop, resize and canvas placement
    pub transform_ms: u64,
    /// End-to-end duration
    pub total_ms: u64,
}

/// How the source photograph was mapped onto the output canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationMetadata {
    /// Source image dimensions (width, height)
    pub source_dimensions: (u32, u32),
    /// Located fundus region
    pub region: FundusRegion,
    /// Scale applied to the crop
    pub scale: f64,
    /// Size of the scaled crop on the canvas (width, height)
    pub resized_dimensions: (u32, u32),
    /// Top-left position of the scaled crop on the canvas
    pub offset: (u32, u32),
    pub timings: NormalizationTimings,
}

/// Square, centered fundus image ready for a classifier
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    image: RgbImage,
    metadata: NormalizationMetadata,
}

impl NormalizedImage {
    /// Wrap a square canvas produced by the normalizer
    #[must_use]
    pub fn new(image: RgbImage, metadata: NormalizationMetadata) -> Self {
        debug_assert_eq!(image.width(), image.height());
        Self { image, metadata }
    }

    /// Output side length in pixels
    #[must_use]
    pub fn diameter(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    #[must_use]
    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image.clone())
    }

    #[must_use]
    pub fn metadata(&self) -> &NormalizationMetadata {
        &self.metadata
    }

    /// Pixel array of shape `(diameter, diameter, 3)` in row-major HWC order
    #[must_use]
    pub fn to_array(&self) -> Array3<u8> {
        let side = self.diameter() as usize;
        Array3::from_shape_fn((side, side, 3), |(y, x, c)| {
            self.image.get_pixel(x as u32, y as u32).0[c]
        })
    }

    /// Pixel array with a leading batch axis: `(1, diameter, diameter, 3)`
    #[must_use]
    pub fn to_batch(&self) -> Array4<u8> {
        self.to_array().insert_axis(ndarray::Axis(0))
    }

    /// Encode the image in the specified format
    ///
    /// # Errors
    /// - Format cannot be encoded with the enabled codecs
    pub fn to_bytes(&self, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        ImageIOService::encode(&self.to_dynamic(), format, jpeg_quality)
    }

    /// Save the image, replacing `path` atomically
    ///
    /// # Errors
    /// - Encoding failures
    /// - Destination directory not writable
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat, jpeg_quality: u8) -> Result<()> {
        let bytes = self.to_bytes(format, jpeg_quality)?;
        ImageIOService::write_atomic(path, &bytes)
    }
}
