//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the in-process analysis scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of analyses processed at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay for every further retry.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any retry delay (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Re-enqueue pending and processing analyses when the scheduler starts.
    #[serde(default = "default_recover")]
    pub recover_on_start: bool,
}

fn default_workers() -> usize {
    2
}

fn default_initial_delay() -> u64 {
    3000 // 3 seconds
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    300_000 // 5 minutes
}

fn default_recover() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            recover_on_start: default_recover(),
        }
    }
}

impl SchedulerConfig {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}
