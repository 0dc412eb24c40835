//! Analysis lifecycle integration tests.
//!
//! These tests run the processor under the scheduler against real SQLite
//! stores, the filesystem document store and generated PDFs, with only the
//! model mocked:
//! - Upload to completed analysis with a success notification
//! - Image-only documents failing without retries
//! - Transient model faults retried with backoff up to the attempt budget
//! - Deleted records dropped silently
//! - Startup recovery of interrupted work

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use cvlens_core::{
    analysis::{AnalysisUpdate, CreateAnalysisRequest},
    document::{DocumentStore, FsDocumentStore, PdfTextExtractor, PDF_CONTENT_TYPE},
    llm::LlmError,
    notification::SUCCESS_MESSAGE,
    testing::{fixtures, MockLlmClient},
    AnalysisProcessor, AnalysisScheduler, AnalysisStatus, AnalysisStore, Notification,
    NotificationConfig, NotificationFilter, NotificationStore, Notifier, PipelineConfig,
    SchedulerConfig, SqliteAnalysisStore, SqliteNotificationStore,
};

const SETTLE: Duration = Duration::from_secs(10);

/// Test helper wiring the full pipeline around a mock model.
struct TestHarness {
    analyses: Arc<SqliteAnalysisStore>,
    notifications: Arc<SqliteNotificationStore>,
    documents: Arc<FsDocumentStore>,
    llm: Arc<MockLlmClient>,
    scheduler: AnalysisScheduler,
    _temp_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::build(fast_scheduler(), None).await
    }

    /// Build the harness over an existing directory, as a restart would.
    async fn build(scheduler_config: SchedulerConfig, temp_dir: Option<TempDir>) -> Self {
        let temp_dir = temp_dir.unwrap_or_else(|| TempDir::new().expect("Failed to create temp dir"));
        let db_path = temp_dir.path().join("cvlens.db");

        let analyses = Arc::new(
            SqliteAnalysisStore::new(&db_path).expect("Failed to create analysis store"),
        );
        let notifications = Arc::new(
            SqliteNotificationStore::new(&db_path).expect("Failed to create notification store"),
        );
        let documents = Arc::new(
            FsDocumentStore::new(temp_dir.path().join("documents"))
                .expect("Failed to create document store"),
        );
        let llm = Arc::new(MockLlmClient::new());

        let processor = AnalysisProcessor::new(
            analyses.clone(),
            Arc::new(PdfTextExtractor::new(documents.clone())),
            llm.clone(),
            Notifier::new(notifications.clone(), NotificationConfig::default()),
            PipelineConfig::default(),
        );
        let scheduler = AnalysisScheduler::new(
            scheduler_config,
            processor.config().max_attempts,
            Arc::new(processor),
            analyses.clone(),
        );
        scheduler.start().await;

        Self {
            analyses,
            notifications,
            documents,
            llm,
            scheduler,
            _temp_dir: temp_dir,
        }
    }

    async fn upload(&self, pdf: Vec<u8>) -> String {
        let document = self
            .documents
            .put(pdf, Some("cv.pdf".to_string()), PDF_CONTENT_TYPE)
            .await
            .expect("Failed to store document");
        self.analyses
            .create(CreateAnalysisRequest { document })
            .expect("Failed to create analysis")
            .id
    }

    async fn submit(&self, pdf: Vec<u8>) -> String {
        let id = self.upload(pdf).await;
        assert!(self.scheduler.enqueue(&id));
        id
    }

    async fn settle(&self) {
        assert!(
            self.scheduler.wait_idle(SETTLE).await,
            "scheduler did not settle"
        );
    }

    fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .list(&NotificationFilter::new())
            .expect("Failed to list notifications")
    }
}

fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        workers: 2,
        initial_delay_ms: 10,
        backoff_multiplier: 2.0,
        max_delay_ms: 100,
        recover_on_start: false,
    }
}

fn cv_pdf() -> Vec<u8> {
    fixtures::pdf_with_pages(&["Jane Doe", "Senior Rust Engineer, 8 years"])
}

#[tokio::test]
async fn test_uploaded_cv_is_analyzed() {
    let harness = TestHarness::new().await;
    harness
        .llm
        .push_text(r#"Here it is: {"summary": "Seasoned engineer", "highlights": ["Rust"]}"#);

    let id = harness.submit(cv_pdf()).await;
    harness.settle().await;

    let record = harness.analyses.get(&id).unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.attempts, 1);
    assert!(record.has_results());
    assert!(record.is_consistent());
    assert_eq!(
        record.analysis_result.as_ref().unwrap()["summary"],
        "Seasoned engineer"
    );
    let text = record.extracted_text.unwrap();
    assert!(text.contains("Jane Doe"));
    assert!(text.contains("Senior Rust Engineer"));

    let prompt = &harness.llm.requests()[0].prompt;
    assert!(prompt.contains("Jane Doe"));

    let notes = harness.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, SUCCESS_MESSAGE);
    assert_eq!(notes[0].link, Some(format!("/analyses/{}", id)));
    assert_eq!(notes[0].subject.subject_id, id);
    assert!(!notes[0].read);
}

#[tokio::test]
async fn test_image_only_pdf_fails_without_retry() {
    let harness = TestHarness::new().await;

    let id = harness.submit(fixtures::pdf_without_text()).await;
    harness.settle().await;

    let record = harness.analyses.get(&id).unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("Could not extract text"));
    assert_eq!(harness.llm.request_count(), 0);

    let notes = harness.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.starts_with("CV analysis failed: "));
    assert!(notes[0].message.chars().count() <= "CV analysis failed: ".len() + 100);
    assert_eq!(harness.scheduler.stats().total_retries, 0);
}

#[tokio::test]
async fn test_transient_model_faults_are_retried() {
    let harness = TestHarness::new().await;
    harness
        .llm
        .push_error(LlmError::Timeout(Duration::from_secs(120)));
    harness
        .llm
        .push_error(LlmError::Http("connection reset".to_string()));
    harness.llm.push_text(r#"{"summary": "Third time lucky"}"#);

    let id = harness.submit(cv_pdf()).await;
    harness.settle().await;

    let record = harness.analyses.get(&id).unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.attempts, 3);
    assert!(record.error_message.is_none());

    // Each failed attempt is reported, then the success.
    let notes = harness.notifications();
    assert_eq!(notes.len(), 3);
    assert_eq!(notes[0].message, SUCCESS_MESSAGE);
    assert_eq!(harness.scheduler.stats().total_retries, 2);
}

#[tokio::test]
async fn test_attempt_budget_leaves_record_failed() {
    let harness = TestHarness::new().await;
    for _ in 0..3 {
        harness.llm.push_error(LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        });
    }

    let id = harness.submit(cv_pdf()).await;
    harness.settle().await;

    let record = harness.analyses.get(&id).unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Failed);
    assert_eq!(record.attempts, 3);
    assert!(record.error_message.unwrap().contains("overloaded"));
    assert_eq!(harness.llm.request_count(), 3);
    assert_eq!(harness.notifications().len(), 3);

    // A stray re-enqueue of the exhausted record is dropped.
    assert!(harness.scheduler.enqueue(&id));
    harness.settle().await;
    assert_eq!(harness.llm.request_count(), 3);
    assert_eq!(harness.notifications().len(), 3);
}

#[tokio::test]
async fn test_deleted_record_is_dropped_silently() {
    let harness = TestHarness::new().await;
    let id = harness.upload(cv_pdf()).await;
    harness.analyses.delete(&id).unwrap();

    assert!(harness.scheduler.enqueue(&id));
    harness.settle().await;

    assert!(harness.notifications().is_empty());
    assert_eq!(harness.llm.request_count(), 0);
    assert_eq!(harness.scheduler.stats().total_discarded, 1);
}

#[tokio::test]
async fn test_restart_recovers_interrupted_work() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let first = TestHarness::build(fast_scheduler(), Some(temp_dir)).await;
    first.scheduler.stop().await;

    // Left pending by a shutdown before dispatch.
    let pending = first.upload(cv_pdf()).await;
    // Crashed during its final attempt.
    let stuck = first.upload(cv_pdf()).await;
    for _ in 0..3 {
        first
            .analyses
            .apply(&stuck, AnalysisUpdate::StartAttempt)
            .unwrap();
    }

    let TestHarness {
        _temp_dir: temp_dir,
        ..
    } = first;

    let config = SchedulerConfig {
        recover_on_start: true,
        ..fast_scheduler()
    };
    let second = TestHarness::build(config, Some(temp_dir)).await;
    second.settle().await;

    let pending = second.analyses.get(&pending).unwrap().unwrap();
    assert_eq!(pending.status, AnalysisStatus::Completed);

    let stuck = second.analyses.get(&stuck).unwrap().unwrap();
    assert_eq!(stuck.status, AnalysisStatus::Failed);
    assert!(stuck.error_message.unwrap().contains("exhausted"));

    assert_eq!(second.notifications().len(), 2);
    assert_eq!(second.llm.request_count(), 1);
}
