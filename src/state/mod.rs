//! Job state tracking
//!
//! This module provides the per-job traversal state machine and counters.
//!
//! # Components
//!
//! - `JobState`: Where a crawl job stands (form loaded, classified, paginating, ...)
//! - `JobProgress`: Per-job counters owned exclusively by the running job

mod job_state;
mod progress;

pub use job_state::JobState;
pub use progress::JobProgress;
