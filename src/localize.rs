//! Fundus localization
//!
//! Separates the bright fundus disk from the dark letterboxing around it and
//! reports the bounding geometry of the dominant foreground blob. Everything
//! here works on a single-channel luminance image; the caller decides how to
//! crop the color image with the result.

use crate::{
    config::{NormalizerConfig, ThresholdMethod},
    types::FundusRegion,
};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use tracing::{debug, trace};

/// Number of luminance levels in an 8-bit histogram
const LEVELS: usize = 256;

/// Why localization gave up on an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalizationFailure {
    /// Image has no pixels
    Empty,
    /// Luminance spread between the 1st and 99th percentiles is too small
    LowContrast { spread: u8 },
    /// No pixel is brighter than the threshold
    NoForeground { threshold: u8 },
    /// Luminance levels do not fall into a dark background and a bright disk
    WeakSeparation { gap: f32, separation: f32 },
    /// Largest connected component is smaller than the minimum area
    RegionTooSmall { area: u64, required: u64 },
}

impl std::fmt::Display for LocalizationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "image has no pixels"),
            Self::LowContrast { spread } => {
                write!(f, "luminance spread {spread} too low to separate a fundus")
            },
            Self::NoForeground { threshold } => {
                write!(f, "no pixel brighter than threshold {threshold}")
            },
            Self::WeakSeparation { gap, separation } => write!(
                f,
                "class means {gap:.1} levels apart ({separation:.1} background deviations), no distinct background"
            ),
            Self::RegionTooSmall { area, required } => {
                write!(f, "largest region has {area} px, need at least {required} px")
            },
        }
    }
}

/// 256-bin luminance histogram
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: [u64; LEVELS],
    total: u64,
}

impl Histogram {
    #[must_use]
    pub fn from_luma(luma: &GrayImage) -> Self {
        let mut bins = [0u64; LEVELS];
        for value in luma.as_raw() {
            if let Some(bin) = bins.get_mut(usize::from(*value)) {
                *bin += 1;
            }
        }
        let total = bins.iter().sum();
        Self { bins, total }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Smallest level at or below which `fraction` of the pixels fall
    #[must_use]
    pub fn percentile(&self, fraction: f64) -> u8 {
        let target = ((self.total as f64) * fraction.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for (level, count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return level as u8;
            }
        }
        u8::MAX
    }

    /// Spread between the 1st and 99th percentiles
    #[must_use]
    pub fn robust_spread(&self) -> u8 {
        self.percentile(0.99).saturating_sub(self.percentile(0.01))
    }

    /// Otsu's threshold: the level maximizing between-class variance
    ///
    /// Pixels at or below the returned level form the dark class.
    #[must_use]
    pub fn otsu_threshold(&self) -> u8 {
        self.otsu_split().map_or(0, |split| split.level)
    }

    /// Split the histogram into a dark and a bright class at Otsu's level
    ///
    /// Returns `None` when all pixels share one level. Ties resolve to the
    /// lowest level; the class means are the same for every tied level.
    #[must_use]
    pub fn otsu_split(&self) -> Option<OtsuSplit> {
        let total = self.total as f64;
        let weighted_sum: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(level, count)| level as f64 * *count as f64)
            .sum();

        let mut background_weight = 0.0;
        let mut background_sum = 0.0;
        let mut best: Option<(f64, usize, f64, f64)> = None;

        for (level, count) in self.bins.iter().enumerate() {
            background_weight += *count as f64;
            if background_weight == 0.0 {
                continue;
            }
            let foreground_weight = total - background_weight;
            if foreground_weight == 0.0 {
                break;
            }

            background_sum += level as f64 * *count as f64;
            let background_mean = background_sum / background_weight;
            let foreground_mean = (weighted_sum - background_sum) / foreground_weight;
            let variance = background_weight
                * foreground_weight
                * (background_mean - foreground_mean).powi(2);

            if best.map_or(true, |(best_variance, ..)| variance > best_variance) {
                best = Some((variance, level, background_mean, foreground_mean));
            }
        }

        let (_, level, background_mean, foreground_mean) = best?;
        let background = self.bins.get(..=level)?;
        let background_count: u64 = background.iter().sum();
        let squared_deviation: f64 = background
            .iter()
            .enumerate()
            .map(|(value, count)| *count as f64 * (value as f64 - background_mean).powi(2))
            .sum();

        Some(OtsuSplit {
            level: level as u8,
            background_mean,
            foreground_mean,
            background_std: (squared_deviation / background_count.max(1) as f64).sqrt(),
        })
    }
}

/// Dark and bright luminance classes separated at Otsu's level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtsuSplit {
    /// Highest level of the dark class
    pub level: u8,
    pub background_mean: f64,
    pub foreground_mean: f64,
    /// Standard deviation of the dark class
    pub background_std: f64,
}

impl OtsuSplit {
    /// Distance between the class means in luminance levels
    #[must_use]
    pub fn gap(&self) -> f64 {
        self.foreground_mean - self.background_mean
    }

    /// Class mean gap in units of the background deviation
    ///
    /// A flat letterbox has almost no deviation; noise and texture spread
    /// the dark class over a range comparable to the gap.
    #[must_use]
    pub fn separation(&self) -> f64 {
        self.gap() / self.background_std.max(1.0)
    }

    /// Level `bias` of the way from the background mean to the foreground mean
    #[must_use]
    pub fn cutoff(&self, bias: f32) -> u8 {
        (self.background_mean + f64::from(bias) * self.gap())
            .round()
            .clamp(0.0, 254.0) as u8
    }
}

/// Resolve the luminance cutoff for this histogram
///
/// Foreground pixels are strictly brighter than the returned level.
#[must_use]
pub fn resolve_threshold(method: ThresholdMethod, histogram: &Histogram) -> u8 {
    match method {
        ThresholdMethod::Fixed { value } => value,
        ThresholdMethod::Otsu { floor, bias } => {
            let Some(split) = histogram.otsu_split() else {
                return floor;
            };
            let cutoff = split.cutoff(bias);
            trace!(
                otsu = split.level,
                background_mean = split.background_mean,
                foreground_mean = split.foreground_mean,
                cutoff,
                floor,
                "Resolved Otsu threshold"
            );
            cutoff.max(floor)
        },
    }
}

/// Statistics of one 8-connected foreground component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub area: u64,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub sum_x: u64,
    pub sum_y: u64,
}

impl Component {
    fn seed(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum_x: 0,
            sum_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += u64::from(x);
        self.sum_y += u64::from(y);
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Centroid in continuous coordinates (pixel centers at `i + 0.5`)
    #[must_use]
    pub fn centroid(&self) -> (f64, f64) {
        let area = self.area.max(1) as f64;
        (
            self.sum_x as f64 / area + 0.5,
            self.sum_y as f64 / area + 0.5,
        )
    }
}

/// Largest 8-connected component of pixels strictly brighter than `threshold`
///
/// Uses an explicit stack so large disks cannot overflow the call stack.
/// Returns `None` when no pixel exceeds the threshold.
#[must_use]
pub fn largest_component(luma: &GrayImage, threshold: u8) -> Option<Component> {
    let (width, height) = luma.dimensions();
    let w = width as usize;
    let h = height as usize;
    let pixels = luma.as_raw();

    let mut visited = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    let mut best: Option<Component> = None;
    let mut component_count = 0usize;

    for start in 0..w * h {
        let is_seed = pixels.get(start).is_some_and(|v| *v > threshold)
            && visited.get(start).is_some_and(|seen| !seen);
        if !is_seed {
            continue;
        }

        component_count += 1;
        let mut component = Component::seed((start % w) as u32, (start / w) as u32);
        if let Some(seen) = visited.get_mut(start) {
            *seen = true;
        }
        stack.push(start);

        while let Some(index) = stack.pop() {
            let x = index % w;
            let y = index / w;
            component.add(x as u32, y as u32);

            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(w - 1);
            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(h - 1);

            for ny in y_lo..=y_hi {
                for nx in x_lo..=x_hi {
                    let neighbor = ny * w + nx;
                    let bright = pixels.get(neighbor).is_some_and(|v| *v > threshold);
                    if let Some(seen) = visited.get_mut(neighbor) {
                        if bright && !*seen {
                            *seen = true;
                            stack.push(neighbor);
                        }
                    }
                }
            }
        }

        if best.map_or(true, |b| component.area > b.area) {
            best = Some(component);
        }
    }

    trace!(component_count, "Labeled foreground components");
    best
}

/// Locate the fundus disk in `image`
///
/// # Errors
/// Returns a [`LocalizationFailure`] when the image is empty, too flat to
/// separate, lacks a distinct dark surround, or its largest foreground
/// component is below the minimum area.
pub fn locate_fundus(
    image: &DynamicImage,
    config: &NormalizerConfig,
) -> std::result::Result<FundusRegion, LocalizationFailure> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(LocalizationFailure::Empty);
    }

    let luma = image.to_luma8();
    let longest = width.max(height);
    let (analysis, factor) = if longest > config.analysis_max_dimension {
        let factor = f64::from(config.analysis_max_dimension) / f64::from(longest);
        let analysis_width = ((f64::from(width) * factor).round() as u32).max(1);
        let analysis_height = ((f64::from(height) * factor).round() as u32).max(1);
        (
            image::imageops::resize(&luma, analysis_width, analysis_height, FilterType::Triangle),
            factor,
        )
    } else {
        (luma, 1.0)
    };

    let histogram = Histogram::from_luma(&analysis);
    let spread = histogram.robust_spread();
    if spread < config.min_contrast {
        return Err(LocalizationFailure::LowContrast { spread });
    }

    // A fundus photograph has a dark surround distinct from the disk; noise
    // and texture alone spread over the range without a background class
    if let Some(split) = histogram.otsu_split() {
        let gap = split.gap();
        let separation = split.separation();
        if gap < f64::from(config.min_contrast) || separation < f64::from(config.min_separation) {
            return Err(LocalizationFailure::WeakSeparation {
                gap: gap as f32,
                separation: separation as f32,
            });
        }
    }

    let threshold = resolve_threshold(config.threshold, &histogram);
    let component = largest_component(&analysis, threshold)
        .ok_or(LocalizationFailure::NoForeground { threshold })?;

    let fraction_area = (histogram.total() as f64 * f64::from(config.min_area_fraction)).ceil() as u64;
    let required = fraction_area.max(u64::from(config.min_area_pixels));
    if component.area < required {
        return Err(LocalizationFailure::RegionTooSmall {
            area: component.area,
            required,
        });
    }

    let region = map_to_source(&component, factor, threshold, width, height);
    debug!(
        threshold,
        spread,
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        area = region.area,
        "Located fundus region"
    );
    Ok(region)
}

/// Scale a component found on the analysis copy back to source pixels
fn map_to_source(
    component: &Component,
    factor: f64,
    threshold: u8,
    source_width: u32,
    source_height: u32,
) -> FundusRegion {
    if (factor - 1.0).abs() < f64::EPSILON {
        return FundusRegion {
            x: component.min_x,
            y: component.min_y,
            width: component.width(),
            height: component.height(),
            area: component.area,
            centroid: component.centroid(),
            threshold,
        };
    }

    let inverse = 1.0 / factor;
    let x0 = ((f64::from(component.min_x) * inverse).floor() as u32).min(source_width - 1);
    let y0 = ((f64::from(component.min_y) * inverse).floor() as u32).min(source_height - 1);
    let x1 = ((f64::from(component.max_x + 1) * inverse).ceil() as u32).clamp(x0 + 1, source_width);
    let y1 = ((f64::from(component.max_y + 1) * inverse).ceil() as u32).clamp(y0 + 1, source_height);
    let (cx, cy) = component.centroid();

    FundusRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
        area: (component.area as f64 * inverse * inverse).round() as u64,
        centroid: (cx * inverse, cy * inverse),
        threshold,
    }
}
