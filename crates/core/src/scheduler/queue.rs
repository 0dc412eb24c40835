//! Analysis scheduler implementation.
//!
//! Runs one task per claimed analysis id. The task acquires a worker permit,
//! runs the job, and then acts on the fault's disposition: discard, give up,
//! or sleep for the backoff delay and try again while the attempt budget
//! lasts. An id stays claimed from enqueue until its task ends, so an id
//! never has two attempts in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisFilter, AnalysisStore};
use crate::metrics;
use crate::pipeline::{AnalysisProcessor, Disposition, PipelineFault};

use super::config::SchedulerConfig;

/// How long [`AnalysisScheduler::stop`] waits for running attempts.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// A unit of work the scheduler can run for an analysis id.
#[async_trait]
pub trait AnalysisJob: Send + Sync {
    async fn run(&self, analysis_id: &str) -> Result<(), PipelineFault>;
}

#[async_trait]
impl AnalysisJob for AnalysisProcessor {
    async fn run(&self, analysis_id: &str) -> Result<(), PipelineFault> {
        self.process(analysis_id).await
    }
}

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub workers: usize,
    /// Ids claimed: running, waiting for a worker, or waiting out a backoff.
    pub claimed: usize,
    /// Attempts executing right now.
    pub active: usize,
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_retries: u64,
    pub total_failed: u64,
    pub total_discarded: u64,
    pub duplicates_dropped: u64,
}

#[derive(Default)]
struct Counters {
    active: AtomicU64,
    enqueued: AtomicU64,
    completed: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    duplicates: AtomicU64,
}

/// State shared between the scheduler handle and its tasks.
struct Shared {
    config: SchedulerConfig,
    max_attempts: u32,
    job: Arc<dyn AnalysisJob>,
    semaphore: Arc<Semaphore>,
    claims: Mutex<HashSet<String>>,
    counters: Counters,
    running: AtomicBool,
}

impl Shared {
    fn release(&self, analysis_id: &str) {
        self.claims.lock().unwrap().remove(analysis_id);
    }
}

/// In-process scheduler with bounded concurrency and retry backoff.
pub struct AnalysisScheduler {
    shared: Arc<Shared>,
    analyses: Arc<dyn AnalysisStore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl AnalysisScheduler {
    /// Create a scheduler. `max_attempts` is the per-analysis attempt
    /// budget, the first attempt included.
    pub fn new(
        config: SchedulerConfig,
        max_attempts: u32,
        job: Arc<dyn AnalysisJob>,
        analyses: Arc<dyn AnalysisStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let workers = config.workers.max(1);

        Self {
            shared: Arc::new(Shared {
                config,
                max_attempts: max_attempts.max(1),
                job,
                semaphore: Arc::new(Semaphore::new(workers)),
                claims: Mutex::new(HashSet::new()),
                counters: Counters::default(),
                running: AtomicBool::new(false),
            }),
            analyses,
            shutdown_tx,
        }
    }

    /// Start accepting work. Runs the recovery sweep when configured.
    pub async fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(
            workers = self.shared.config.workers,
            max_attempts = self.shared.max_attempts,
            "Starting analysis scheduler"
        );

        if self.shared.config.recover_on_start {
            let recovered = self.recover();
            if recovered > 0 {
                info!(recovered, "Re-enqueued unfinished analyses");
            }
        }
    }

    /// Stop accepting work and wait for running attempts to finish.
    ///
    /// Claimed ids that were waiting for a worker or a backoff are dropped;
    /// their records stay `Pending` or `Failed` and the next start's
    /// recovery sweep picks up the pending ones.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping analysis scheduler");
        let _ = self.shutdown_tx.send(());

        let deadline = Instant::now() + STOP_GRACE;
        while self.shared.counters.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!("Timed out waiting for running analyses");
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        info!("Analysis scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Queue an analysis for processing.
    ///
    /// Returns false when the scheduler is stopped or the id is already
    /// claimed.
    pub fn enqueue(&self, analysis_id: &str) -> bool {
        if !self.is_running() {
            warn!(analysis_id, "Scheduler not running, analysis left pending");
            return false;
        }

        if !self.shared.claims.lock().unwrap().insert(analysis_id.to_string()) {
            debug!(analysis_id, "Analysis already claimed, dropping duplicate");
            self.shared
                .counters
                .duplicates
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.shared
            .counters
            .enqueued
            .fetch_add(1, Ordering::Relaxed);
        debug!(analysis_id, "Analysis enqueued");

        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let analysis_id = analysis_id.to_string();
        tokio::spawn(async move {
            drive(&shared, &analysis_id, shutdown_rx).await;
            shared.release(&analysis_id);
        });

        true
    }

    /// Enqueue every `Pending` or `Processing` analysis. Returns how many
    /// were accepted.
    pub fn recover(&self) -> usize {
        let mut ids = Vec::new();
        let mut filter = AnalysisFilter::open().with_limit(100);
        loop {
            match self.analyses.list(&filter) {
                Ok(page) => {
                    let page_len = page.len() as i64;
                    ids.extend(page.into_iter().map(|record| record.id));
                    if page_len < filter.limit {
                        break;
                    }
                    filter.offset += page_len;
                }
                Err(e) => {
                    error!(error = %e, "Recovery sweep failed to list analyses");
                    break;
                }
            }
        }

        ids.iter().filter(|id| self.enqueue(id)).count()
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            running: self.is_running(),
            workers: self.shared.config.workers,
            claimed: self.shared.claims.lock().unwrap().len(),
            active: c.active.load(Ordering::Relaxed) as usize,
            total_enqueued: c.enqueued.load(Ordering::Relaxed),
            total_completed: c.completed.load(Ordering::Relaxed),
            total_retries: c.retries.load(Ordering::Relaxed),
            total_failed: c.failed.load(Ordering::Relaxed),
            total_discarded: c.discarded.load(Ordering::Relaxed),
            duplicates_dropped: c.duplicates.load(Ordering::Relaxed),
        }
    }

    /// Wait until no id is claimed. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.claims.lock().unwrap().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Run attempts for one claimed id until it settles.
async fn drive(shared: &Shared, analysis_id: &str, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut attempt: u32 = 1;
    loop {
        let permit = tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(analysis_id, "Shutdown before attempt started");
                return;
            }
            permit = Arc::clone(&shared.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        shared.counters.active.fetch_add(1, Ordering::SeqCst);
        let result = shared.job.run(analysis_id).await;
        shared.counters.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        let fault = match result {
            Ok(()) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(fault) => fault,
        };

        match fault.disposition() {
            Disposition::Discard => {
                debug!(analysis_id, reason = %fault, "Job discarded");
                shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Disposition::GiveUp => {
                warn!(analysis_id, kind = fault.kind(), "Analysis failed permanently");
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Disposition::Retry if attempt >= shared.max_attempts => {
                warn!(
                    analysis_id,
                    attempts = attempt,
                    kind = fault.kind(),
                    "Retry budget exhausted"
                );
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Disposition::Retry => {
                let delay = shared.config.backoff(attempt);
                info!(
                    analysis_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = fault.kind(),
                    "Scheduling retry"
                );
                shared.counters.retries.fetch_add(1, Ordering::Relaxed);
                metrics::SCHEDULER_RETRIES.inc();

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(analysis_id, "Shutdown during backoff");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalysisStatus, AnalysisUpdate, CreateAnalysisRequest, SqliteAnalysisStore,
    };
    use crate::document::{DocumentRef, ExtractionError};
    use crate::llm::LlmError;
    use crate::testing::MockAnalysisJob;

    fn fast_config(workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            initial_delay_ms: 5,
            backoff_multiplier: 2.0,
            max_delay_ms: 50,
            recover_on_start: false,
        }
    }

    fn scheduler(config: SchedulerConfig, job: Arc<MockAnalysisJob>) -> AnalysisScheduler {
        let analyses = Arc::new(SqliteAnalysisStore::in_memory().unwrap());
        AnalysisScheduler::new(config, 3, job, analyses)
    }

    fn transient() -> PipelineFault {
        PipelineFault::Model(LlmError::Http("connection reset".to_string()))
    }

    #[tokio::test]
    async fn test_successful_job_runs_once() {
        let job = Arc::new(MockAnalysisJob::new());
        let scheduler = scheduler(fast_config(2), job.clone());
        scheduler.start().await;

        assert!(scheduler.enqueue("a-1"));
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls(), vec!["a-1".to_string()]);
        let stats = scheduler.stats();
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.total_retries, 0);
        assert_eq!(stats.claimed, 0);
    }

    #[tokio::test]
    async fn test_transient_faults_are_retried_until_success() {
        let job = Arc::new(MockAnalysisJob::new());
        job.push_fault(transient());
        job.push_fault(transient());
        let scheduler = scheduler(fast_config(1), job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 3);
        let stats = scheduler.stats();
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.total_completed, 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_attempt_budget() {
        let job = Arc::new(MockAnalysisJob::new());
        for _ in 0..5 {
            job.push_fault(transient());
        }
        let scheduler = scheduler(fast_config(1), job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 3);
        assert_eq!(scheduler.stats().total_failed, 1);
    }

    #[tokio::test]
    async fn test_retry_delays_increase() {
        let job = Arc::new(MockAnalysisJob::new());
        job.push_fault(transient());
        job.push_fault(transient());
        let config = SchedulerConfig {
            initial_delay_ms: 40,
            max_delay_ms: 1000,
            ..fast_config(1)
        };
        let scheduler = scheduler(config, job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        let times = job.call_times();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(40));
        assert!(times[2] - times[1] >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_retried() {
        let job = Arc::new(MockAnalysisJob::new());
        job.push_fault(PipelineFault::Extraction(ExtractionError::NoText));
        let scheduler = scheduler(fast_config(1), job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 1);
        assert_eq!(scheduler.stats().total_failed, 1);
        assert_eq!(scheduler.stats().total_retries, 0);
    }

    #[tokio::test]
    async fn test_missing_record_is_discarded() {
        let job = Arc::new(MockAnalysisJob::new());
        job.push_fault(PipelineFault::NotFound {
            analysis_id: "a-1".to_string(),
        });
        let scheduler = scheduler(fast_config(1), job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 1);
        assert_eq!(scheduler.stats().total_discarded, 1);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_dropped_while_claimed() {
        let job = Arc::new(MockAnalysisJob::new());
        job.set_delay(Duration::from_millis(100));
        let scheduler = scheduler(fast_config(2), job.clone());
        scheduler.start().await;

        assert!(scheduler.enqueue("a-1"));
        assert!(!scheduler.enqueue("a-1"));
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 1);
        assert_eq!(scheduler.stats().duplicates_dropped, 1);

        // Released once settled.
        assert!(scheduler.enqueue("a-1"));
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(job.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_workers() {
        let job = Arc::new(MockAnalysisJob::new());
        job.set_delay(Duration::from_millis(50));
        let scheduler = scheduler(fast_config(2), job.clone());
        scheduler.start().await;

        for i in 0..6 {
            scheduler.enqueue(&format!("a-{}", i));
        }
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(job.calls().len(), 6);
        assert!(job.max_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_enqueue_requires_running() {
        let job = Arc::new(MockAnalysisJob::new());
        let scheduler = scheduler(fast_config(1), job.clone());

        assert!(!scheduler.enqueue("a-1"));
        assert!(job.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_backoff() {
        let job = Arc::new(MockAnalysisJob::new());
        job.push_fault(transient());
        let config = SchedulerConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..fast_config(1)
        };
        let scheduler = scheduler(config, job.clone());
        scheduler.start().await;

        scheduler.enqueue("a-1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(job.calls().len(), 1);
        assert!(!scheduler.stats().running);
    }

    #[tokio::test]
    async fn test_start_recovers_open_analyses() {
        let analyses = Arc::new(SqliteAnalysisStore::in_memory().unwrap());
        let document = DocumentRef {
            key: uuid::Uuid::new_v4().to_string(),
            filename: None,
            content_type: "application/pdf".to_string(),
            byte_size: 1,
        };
        let create = || {
            analyses
                .create(CreateAnalysisRequest {
                    document: document.clone(),
                })
                .unwrap()
                .id
        };

        let pending = create();
        let processing = create();
        analyses
            .apply(&processing, AnalysisUpdate::StartAttempt)
            .unwrap();
        let completed = create();
        analyses
            .apply(&completed, AnalysisUpdate::StartAttempt)
            .unwrap();
        analyses
            .apply(&completed, AnalysisUpdate::Complete(serde_json::json!({})))
            .unwrap();
        assert_eq!(
            analyses.get(&completed).unwrap().unwrap().status,
            AnalysisStatus::Completed
        );

        let job = Arc::new(MockAnalysisJob::new());
        let config = SchedulerConfig {
            recover_on_start: true,
            ..fast_config(2)
        };
        let scheduler = AnalysisScheduler::new(config, 3, job.clone(), analyses.clone());
        scheduler.start().await;
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        let mut calls = job.calls();
        calls.sort();
        let mut expected = vec![pending, processing];
        expected.sort();
        assert_eq!(calls, expected);
    }
}
