//! Shared image preprocessing utilities
//!
//! Aspect-preserving resize and letterboxing onto a square canvas. The
//! normalizer feeds the fundus crop through here; nothing in this module
//! knows about fundus localization.

use crate::config::ResizeFilter;
use image::{imageops, Rgb, RgbImage};

/// Configuration for letterboxing behavior
#[derive(Debug, Clone, Copy)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
    /// Resampling filter
    pub filter: ResizeFilter,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [0, 0, 0], // Black padding
            filter: ResizeFilter::Triangle,
        }
    }
}

/// Where the resized image landed on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Effective scale factor (resized width over source width)
    pub scale: f64,
    /// Resized image size (width, height)
    pub resized: (u32, u32),
    /// Top-left corner on the canvas
    pub offset: (u32, u32),
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Fit dimensions inside a `target × target` square without distortion
    ///
    /// The larger side becomes exactly `target`; the other side is rounded and
    /// never drops below one pixel.
    #[must_use]
    pub fn fit_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
        let target_f64 = f64::from(target);
        let scale = (target_f64 / f64::from(width.max(1))).min(target_f64 / f64::from(height.max(1)));

        let new_width = (f64::from(width) * scale).round().clamp(1.0, target_f64) as u32;
        let new_height = (f64::from(height) * scale).round().clamp(1.0, target_f64) as u32;
        (new_width, new_height)
    }

    /// Resize `image` to fit a `target × target` canvas and place it there
    ///
    /// `anchor` is a point in `image` coordinates that should land on the
    /// canvas center. The offset is clamped so the resized image never leaves
    /// the canvas; with the anchor at the image center this is plain centering.
    /// Images already at their fitted size are copied without resampling.
    #[must_use]
    pub fn letterbox(
        image: &RgbImage,
        target: u32,
        anchor: (f64, f64),
        options: &PreprocessingOptions,
    ) -> (RgbImage, Placement) {
        let (orig_width, orig_height) = image.dimensions();
        let (new_width, new_height) = Self::fit_dimensions(orig_width, orig_height, target);

        let resized = if (new_width, new_height) == (orig_width, orig_height) {
            image.clone()
        } else {
            imageops::resize(image, new_width, new_height, options.filter.filter_type())
        };

        let scale_x = f64::from(new_width) / f64::from(orig_width.max(1));
        let scale_y = f64::from(new_height) / f64::from(orig_height.max(1));
        let center = f64::from(target) / 2.0;

        let offset_x = Self::anchored_offset(center - anchor.0 * scale_x, target - new_width);
        let offset_y = Self::anchored_offset(center - anchor.1 * scale_y, target - new_height);

        let padding = options.padding_color;
        let mut canvas = RgbImage::from_pixel(target, target, Rgb(padding));
        imageops::replace(&mut canvas, &resized, i64::from(offset_x), i64::from(offset_y));

        let placement = Placement {
            scale: scale_x,
            resized: (new_width, new_height),
            offset: (offset_x, offset_y),
        };
        (canvas, placement)
    }

    fn anchored_offset(desired: f64, slack: u32) -> u32 {
        desired.round().clamp(0.0, f64::from(slack)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(ImagePreprocessor::fit_dimensions(100, 100, 299), (299, 299));
        assert_eq!(ImagePreprocessor::fit_dimensions(400, 200, 100), (100, 50));
        assert_eq!(ImagePreprocessor::fit_dimensions(200, 400, 100), (50, 100));
        assert_eq!(ImagePreprocessor::fit_dimensions(1000, 1, 100), (100, 1));
    }

    #[test]
    fn test_letterbox_centers_wide_image() {
        let image = solid(200, 100, 255);
        let center = (100.0, 50.0);
        let (canvas, placement) =
            ImagePreprocessor::letterbox(&image, 100, center, &PreprocessingOptions::default());

        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(placement.resized, (100, 50));
        assert_eq!(placement.offset, (0, 25));
        assert!((placement.scale - 0.5).abs() < 1e-9);
        assert_eq!(canvas.get_pixel(50, 10).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(50, 50).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(50, 90).0, [0, 0, 0]);
    }

    #[test]
    fn test_letterbox_anchor_is_clamped_to_canvas() {
        let image = solid(50, 100, 200);
        let (_, placement) = ImagePreprocessor::letterbox(
            &image,
            100,
            (-500.0, 50.0),
            &PreprocessingOptions::default(),
        );
        assert_eq!(placement.offset, (50, 0));

        let (_, placement) = ImagePreprocessor::letterbox(
            &image,
            100,
            (10.0, 50.0),
            &PreprocessingOptions::default(),
        );
        assert_eq!(placement.offset, (40, 0));
    }

    #[test]
    fn test_letterbox_same_size_is_identity() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8, y as u8, 7]));
        let (canvas, placement) = ImagePreprocessor::letterbox(
            &image,
            32,
            (16.0, 16.0),
            &PreprocessingOptions::default(),
        );
        assert_eq!(canvas, image);
        assert_eq!(placement.offset, (0, 0));
        assert!((placement.scale - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_letterbox_custom_padding() {
        let options = PreprocessingOptions {
            padding_color: [0, 255, 0],
            filter: ResizeFilter::Nearest,
        };
        let (canvas, _) = ImagePreprocessor::letterbox(&solid(10, 5, 0), 20, (5.0, 2.5), &options);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 255, 0]);
    }
}
