//! Service layer
//!
//! Infrastructure concerns kept apart from the normalization pipeline.

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    BatchProcessingStats, ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter,
    ProgressTracker,
};
