//! Concurrent batch normalization
//!
//! Runs `FundusNormalizer::normalize_file` over many source/destination pairs
//! on tokio's blocking pool. A failing item is recorded and never aborts the
//! rest of the batch.

use crate::{
    error::{FundusError, Result},
    normalizer::FundusNormalizer,
    services::{ImageIOService, NoOpProgressReporter, ProgressReporter, ProgressTracker},
};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument, warn};

/// One unit of batch work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl BatchJob {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source: P, destination: Q) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Overwrite the source with its normalized version
    pub fn in_place<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            destination: path.clone(),
            source: path,
        }
    }
}

/// Outcome of a single batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Normalized,
    NoFundus,
    Failed(String),
}

impl fmt::Display for BatchItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalized => write!(f, "normalized"),
            Self::NoFundus => write!(f, "no fundus"),
            Self::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: BatchItemStatus,
    pub duration_ms: u64,
}

impl BatchItemResult {
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.status == BatchItemStatus::Normalized
    }
}

/// Report for a finished batch, items in submission order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub diameter: u32,
    pub total: usize,
    pub normalized: usize,
    pub no_fundus: usize,
    pub failed: usize,
    pub items: Vec<BatchItemResult>,
}

impl BatchSummary {
    /// Build a summary that finished now and took `duration_ms`
    #[must_use]
    pub fn from_items(diameter: u32, items: Vec<BatchItemResult>, duration_ms: u64) -> Self {
        let finished_at = Utc::now();
        let started_at = finished_at - chrono::Duration::milliseconds(duration_ms as i64);

        let count = |wanted: fn(&BatchItemStatus) -> bool| items.iter().filter(|i| wanted(&i.status)).count();
        let normalized = count(|s| matches!(s, BatchItemStatus::Normalized));
        let no_fundus = count(|s| matches!(s, BatchItemStatus::NoFundus));
        let failed = count(|s| matches!(s, BatchItemStatus::Failed(_)));

        Self {
            started_at,
            finished_at,
            duration_ms,
            diameter,
            total: items.len(),
            normalized,
            no_fundus,
            failed,
            items,
        }
    }

    /// Items that failed, in submission order
    pub fn failures(&self) -> impl Iterator<Item = &BatchItemResult> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, BatchItemStatus::Failed(_)))
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    /// Returns `FundusError::Internal` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FundusError::internal(format!("Failed to serialize batch summary: {e}")))
    }

    /// Write the summary as JSON, replacing `path` atomically
    ///
    /// # Errors
    /// Returns `FundusError::Io` if the report cannot be written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        ImageIOService::write_atomic(path.as_ref(), json.as_bytes())
    }
}

/// Normalizes many files concurrently
pub struct BatchNormalizer {
    normalizer: Arc<FundusNormalizer>,
    concurrency: usize,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchNormalizer {
    /// Create a batch driver using every available core
    #[must_use]
    pub fn new(normalizer: FundusNormalizer) -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            normalizer: Arc::new(normalizer),
            concurrency,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Limit the number of files in flight (minimum 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn normalizer(&self) -> &FundusNormalizer {
        &self.normalizer
    }

    /// Process every job and return a summary in submission order
    #[instrument(skip_all, fields(jobs = jobs.len(), concurrency = self.concurrency))]
    pub async fn run(&self, jobs: Vec<BatchJob>) -> BatchSummary {
        let start = Instant::now();
        let total = jobs.len();
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter), total);

        let mut results = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| {
                let normalizer = Arc::clone(&self.normalizer);
                async move { (index, Self::process_job(normalizer, job).await) }
            })
            .buffer_unordered(self.concurrency);

        let mut slots: Vec<Option<BatchItemResult>> = vec![None; total];
        while let Some((index, item)) = results.next().await {
            tracker.record(&item);
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(item);
            }
        }

        let items: Vec<BatchItemResult> = slots.into_iter().flatten().collect();
        let summary = BatchSummary::from_items(
            self.normalizer.config().diameter,
            items,
            start.elapsed().as_millis() as u64,
        );
        tracker.finish(&summary);
        summary
    }

    async fn process_job(normalizer: Arc<FundusNormalizer>, job: BatchJob) -> BatchItemResult {
        let start = Instant::now();
        let BatchJob {
            source,
            destination,
        } = job;

        let task_source = source.clone();
        let task_destination = destination.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            normalizer.normalize_file(&task_source, &task_destination)
        })
        .await;

        let status = match outcome {
            Ok(Ok(true)) => BatchItemStatus::Normalized,
            Ok(Ok(false)) => BatchItemStatus::NoFundus,
            Ok(Err(e)) => {
                warn!(source = %source.display(), error = %e, "Normalization failed");
                BatchItemStatus::Failed(e.to_string())
            },
            Err(join_error) => {
                warn!(source = %source.display(), error = %join_error, "Normalization task aborted");
                BatchItemStatus::Failed(format!("worker task failed: {join_error}"))
            },
        };
        debug!(source = %source.display(), %status, "Batch item finished");

        BatchItemResult {
            source,
            destination,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_disk(path: &Path) {
        DynamicImage::ImageRgb8(RgbImage::from_fn(200, 160, |x, y| {
            let dx = f64::from(x) - 100.0;
            let dy = f64::from(y) - 80.0;
            if dx * dx + dy * dy <= 70.0 * 70.0 {
                Rgb([200, 100, 50])
            } else {
                Rgb([0, 0, 0])
            }
        }))
        .save(path)
        .unwrap();
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.png");
        let black = temp_dir.path().join("black.png");
        let corrupt = temp_dir.path().join("corrupt.png");
        write_disk(&good);
        DynamicImage::ImageRgb8(RgbImage::new(64, 64)).save(&black).unwrap();
        std::fs::write(&corrupt, b"definitely not a png").unwrap();

        let out = temp_dir.path().join("out");
        let jobs = vec![
            BatchJob::new(&corrupt, out.join("corrupt.png")),
            BatchJob::new(&good, out.join("good.png")),
            BatchJob::new(&black, out.join("black.png")),
        ];

        let batch = BatchNormalizer::new(FundusNormalizer::with_diameter(96).unwrap()).with_concurrency(2);
        let summary = batch.run(jobs).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.normalized, 1);
        assert_eq!(summary.no_fundus, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.diameter, 96);
        assert_eq!(summary.items[0].source, corrupt);
        assert!(matches!(summary.items[0].status, BatchItemStatus::Failed(_)));
        assert!(summary.items[1].is_normalized());
        assert_eq!(summary.items[2].status, BatchItemStatus::NoFundus);
        assert_eq!(summary.failures().count(), 1);

        let written = image::open(out.join("good.png")).unwrap();
        assert_eq!((written.width(), written.height()), (96, 96));
        assert!(!out.join("black.png").exists());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let summary = BatchNormalizer::new(FundusNormalizer::default()).run(Vec::new()).await;
        assert_eq!(summary.total, 0);
        assert!(summary.items.is_empty());
    }

    #[test]
    fn test_concurrency_floor() {
        let batch = BatchNormalizer::new(FundusNormalizer::default()).with_concurrency(0);
        assert_eq!(batch.concurrency(), 1);
    }

    #[test]
    fn test_summary_json_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let report = temp_dir.path().join("reports/summary.json");
        let summary = BatchSummary::from_items(
            299,
            vec![
                BatchItemResult {
                    source: PathBuf::from("a.png"),
                    destination: PathBuf::from("a_normalized.png"),
                    status: BatchItemStatus::Normalized,
                    duration_ms: 12,
                },
                BatchItemResult {
                    source: PathBuf::from("b.png"),
                    destination: PathBuf::from("b_normalized.png"),
                    status: BatchItemStatus::Failed("decode error".to_string()),
                    duration_ms: 1,
                },
            ],
            40,
        );
        summary.write_json(&report).unwrap();

        let text = std::fs::read_to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["items"][0]["status"], "normalized");
        assert_eq!(value["items"][1]["status"]["failed"], "decode error");

        let parsed: BatchSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.items, summary.items);
        assert_eq!(parsed.failed, 1);
    }
}
