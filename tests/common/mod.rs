//! Synthetic fundus photographs shared by the integration tests

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Reddish retina color used for synthetic disks
pub const FUNDUS_COLOR: Rgb<u8> = Rgb([190, 90, 40]);

/// A bright disk of `radius` centered at `(cx, cy)` on a near-black frame
///
/// Parts of the disk outside the frame are clipped, like a camera that
/// crops the retina.
pub fn disk_photo(width: u32, height: u32, cx: f64, cy: f64, radius: f64) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let dx = f64::from(x) + 0.5 - cx;
        let dy = f64::from(y) + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
            FUNDUS_COLOR
        } else {
            Rgb([4, 3, 3])
        }
    }))
}

/// Like [`disk_photo`] with a flat gray letterbox at `background`
pub fn disk_photo_on(width: u32, height: u32, cx: f64, cy: f64, radius: f64, background: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let dx = f64::from(x) + 0.5 - cx;
        let dy = f64::from(y) + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
            FUNDUS_COLOR
        } else {
            Rgb([background, background, background])
        }
    }))
}

/// Deterministic per-pixel hash
pub fn pixel_hash(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^ (h >> 16)
}

/// Gray noise uniform over `low..=high` with no background class
pub fn noise_photo(width: u32, height: u32, low: u8, high: u8) -> DynamicImage {
    let range = u32::from(high - low) + 1;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let value = low + (pixel_hash(x, y) % range) as u8;
        Rgb([value, value, value])
    }))
}

pub fn uniform_photo(width: u32, height: u32, level: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([level, level, level])))
}

/// Centroid of pixels whose luminance exceeds `cutoff`
pub fn bright_centroid(image: &RgbImage, cutoff: u8) -> Option<(f64, f64)> {
    let luma = DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let (mut sum_x, mut sum_y, mut count) = (0.0, 0.0, 0u64);
    for (x, y, pixel) in luma.enumerate_pixels() {
        if pixel.0[0] > cutoff {
            sum_x += f64::from(x) + 0.5;
            sum_y += f64::from(y) + 0.5;
            count += 1;
        }
    }
    (count > 0).then(|| (sum_x / count as f64, sum_y / count as f64))
}

/// Write `image` to `dir/name`, format chosen by the extension
pub fn write_photo(dir: &Path, name: &str, image: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}
