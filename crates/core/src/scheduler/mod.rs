//! In-process analysis scheduler.
//!
//! Dispatches analysis ids to a bounded worker pool, guarantees at most one
//! attempt in flight per id, and retries transient faults with exponential
//! backoff until the attempt budget is spent.

mod config;
mod queue;

pub use config::SchedulerConfig;
pub use queue::{AnalysisJob, AnalysisScheduler, SchedulerStats};
