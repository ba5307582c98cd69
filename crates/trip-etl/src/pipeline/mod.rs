//! Pipeline module.
//!
//! Orchestrates extract, clean and transform in sequence and reports
//! progress along the way.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
