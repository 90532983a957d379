//! Classifier collaborator interface
//!
//! The classifier itself lives outside this crate. Normalized images are
//! stacked into an `(N, d, d, 3)` batch and handed to any implementation of
//! [`Classifier`], which returns one score per image.

use crate::{
    error::{FundusError, Result},
    types::NormalizedImage,
};
use ndarray::{Array4, ArrayView4, Axis};

/// Consumer of normalized fundus batches
pub trait Classifier {
    /// Diameter of the square images the classifier expects
    fn input_diameter(&self) -> u32;

    /// Score a batch of shape `(N, d, d, 3)`
    ///
    /// # Errors
    /// - Batch shape does not match the classifier's input
    /// - Failures inside the classifier implementation
    fn predict(&mut self, batch: ArrayView4<'_, u8>) -> Result<Vec<f32>>;
}

/// Stack normalized images into one `(N, d, d, 3)` array
///
/// # Errors
/// Returns `FundusError::Classifier` for an empty slice or mixed diameters.
pub fn stack_batch(images: &[NormalizedImage]) -> Result<Array4<u8>> {
    let first = images
        .first()
        .ok_or_else(|| FundusError::classifier("Cannot build a batch from zero images"))?;
    let diameter = first.diameter();

    if let Some(odd) = images.iter().find(|image| image.diameter() != diameter) {
        return Err(FundusError::classifier(format!(
            "Mixed diameters in batch: expected {diameter}, found {}",
            odd.diameter()
        )));
    }

    let side = diameter as usize;
    Ok(Array4::from_shape_fn(
        (images.len(), side, side, 3),
        |(n, y, x, c)| images[n].image().get_pixel(x as u32, y as u32)[c],
    ))
}

/// Run `classifier` over normalized images, one score per image
///
/// # Errors
/// Returns `FundusError::Classifier` if the images do not match the
/// classifier's input diameter or the classifier returns the wrong number of
/// scores.
pub fn classify(classifier: &mut dyn Classifier, images: &[NormalizedImage]) -> Result<Vec<f32>> {
    let batch = stack_batch(images)?;
    let expected = classifier.input_diameter() as usize;
    let actual = batch.len_of(Axis(1));
    if actual != expected {
        return Err(FundusError::classifier(format!(
            "Classifier expects {expected}x{expected} inputs, got {actual}x{actual}"
        )));
    }

    let scores = classifier.predict(batch.view())?;
    if scores.len() != images.len() {
        return Err(FundusError::classifier(format!(
            "Classifier returned {} scores for {} images",
            scores.len(),
            images.len()
        )));
    }
    tracing::debug!(images = images.len(), "Classified batch");
    Ok(scores)
}

/// Deterministic stand-in that scores by mean intensity in `[0, 1]`
#[derive(Debug, Clone)]
pub struct MockClassifier {
    input_diameter: u32,
    calls: usize,
}

impl MockClassifier {
    #[must_use]
    pub fn new(input_diameter: u32) -> Self {
        Self {
            input_diameter,
            calls: 0,
        }
    }

    /// Number of `predict` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Classifier for MockClassifier {
    fn input_diameter(&self) -> u32 {
        self.input_diameter
    }

    fn predict(&mut self, batch: ArrayView4<'_, u8>) -> Result<Vec<f32>> {
        let (_, height, width, channels) = batch.dim();
        let side = self.input_diameter as usize;
        if height != side || width != side || channels != 3 {
            return Err(FundusError::classifier(format!(
                "Unexpected batch shape {:?}",
                batch.shape()
            )));
        }

        self.calls += 1;
        let per_image = (height * width * channels) as f32;
        Ok(batch
            .outer_iter()
            .map(|image| {
                let sum: u64 = image.iter().map(|&v| u64::from(v)).sum();
                sum as f32 / (per_image * 255.0)
            })
            .collect())
    }
}
