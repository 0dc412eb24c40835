//! Mock scheduler job for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::pipeline::PipelineFault;
use crate::scheduler::AnalysisJob;

/// Mock implementation of the AnalysisJob trait.
///
/// Queued faults are returned one per run; once the queue is empty every
/// run succeeds. Tracks call order, call times and peak concurrency.
#[derive(Debug, Default)]
pub struct MockAnalysisJob {
    faults: Mutex<VecDeque<PipelineFault>>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockAnalysisJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fault(&self, fault: PipelineFault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    /// Make every run take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Ids in the order they were run.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// Highest number of runs observed at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisJob for MockAnalysisJob {
    async fn run(&self, analysis_id: &str) -> Result<(), PipelineFault> {
        self.calls
            .lock()
            .unwrap()
            .push((analysis_id.to_string(), Instant::now()));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match self.faults.lock().unwrap().pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}
