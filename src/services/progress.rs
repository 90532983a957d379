//! Progress reporting service
//!
//! This module separates progress reporting concerns from the batch driver,
//! allowing different frontends to implement their own progress handling.

use crate::batch::{BatchItemResult, BatchItemStatus, BatchSummary};
use instant::Instant;
use std::sync::Arc;

/// Statistics for batch processing operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchProcessingStats {
    /// Number of items completed, whatever their outcome
    pub items_completed: usize,
    /// Total number of items to process
    pub items_total: usize,
    /// Number of items written as normalized images
    pub items_normalized: usize,
    /// Number of items where no fundus was found
    pub items_skipped: usize,
    /// Number of items that failed processing
    pub items_failed: usize,
    /// Name/path of the most recently completed item
    pub current_item_name: String,
    /// Processing rate in items per second
    pub processing_rate: f64,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
}

impl BatchProcessingStats {
    #[must_use]
    pub fn new(items_total: usize) -> Self {
        Self {
            items_total,
            ..Self::default()
        }
    }

    /// Completed fraction as a percentage (0-100)
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_completed * 100) / self.items_total).min(100) as u8
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items_total.saturating_sub(self.items_completed)
    }

    /// Fold a finished item into the counters
    pub fn record(&mut self, item: &BatchItemResult, elapsed_seconds: f64) {
        self.items_completed += 1;
        match item.status {
            BatchItemStatus::Normalized => self.items_normalized += 1,
            BatchItemStatus::NoFundus => self.items_skipped += 1,
            BatchItemStatus::Failed(_) => self.items_failed += 1,
        }
        self.current_item_name = item.source.display().to_string();

        self.processing_rate = if elapsed_seconds > 0.0 {
            self.items_completed as f64 / elapsed_seconds
        } else {
            0.0
        };
        self.eta_seconds = if self.processing_rate > 0.0 {
            Some((self.remaining() as f64 / self.processing_rate) as u64)
        } else {
            None
        };
    }
}

/// Trait for reporting progress during batch normalization
pub trait ProgressReporter: Send + Sync {
    /// Called once before any item is processed
    fn report_start(&self, items_total: usize) {
        let _ = items_total;
    }

    /// Report a finished item together with the running statistics
    fn report_item(&self, item: &BatchItemResult, stats: &BatchProcessingStats);

    /// Report batch completion
    fn report_completion(&self, summary: &BatchSummary);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_item(&self, _item: &BatchItemResult, _stats: &BatchProcessingStats) {}

    fn report_completion(&self, _summary: &BatchSummary) {}
}

/// Progress reporter that emits tracing events
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every item instead of failures only
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn format_eta(eta_seconds: Option<u64>) -> String {
        match eta_seconds {
            Some(seconds) if seconds < 60 => format!("{seconds}s"),
            Some(seconds) => format!("{}m {}s", seconds / 60, seconds % 60),
            None => "calculating...".to_string(),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_start(&self, items_total: usize) {
        tracing::info!(items_total, "Starting batch normalization");
    }

    fn report_item(&self, item: &BatchItemResult, stats: &BatchProcessingStats) {
        if let BatchItemStatus::Failed(ref error) = item.status {
            tracing::error!(source = %item.source.display(), %error, "Failed to normalize");
        } else if self.verbose {
            tracing::info!(
                "[{}%] {} {}/{} ({:.1} files/sec, ETA {})",
                stats.progress_percentage(),
                item.status,
                stats.items_completed,
                stats.items_total,
                stats.processing_rate,
                Self::format_eta(stats.eta_seconds)
            );
        }
    }

    fn report_completion(&self, summary: &BatchSummary) {
        tracing::info!(
            total = summary.total,
            normalized = summary.normalized,
            no_fundus = summary.no_fundus,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Batch normalization completed"
        );
    }
}

/// Progress tracker that owns the running statistics for one batch
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    stats: BatchProcessingStats,
}

impl ProgressTracker {
    /// Create a tracker and announce the batch to the reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>, items_total: usize) -> Self {
        reporter.report_start(items_total);
        Self {
            reporter,
            start_time: Instant::now(),
            stats: BatchProcessingStats::new(items_total),
        }
    }

    /// Create a tracker with no-op reporter
    #[must_use]
    pub fn no_op(items_total: usize) -> Self {
        Self::new(Arc::new(NoOpProgressReporter), items_total)
    }

    pub fn record(&mut self, item: &BatchItemResult) {
        self.stats
            .record(item, self.start_time.elapsed().as_secs_f64());
        self.reporter.report_item(item, &self.stats);
    }

    pub fn finish(&self, summary: &BatchSummary) {
        self.reporter.report_completion(summary);
    }

    #[must_use]
    pub fn stats(&self) -> &BatchProcessingStats {
        &self.stats
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}
