//! Common test utilities for in-process API testing.
//!
//! The fixture wires the real SQLite stores, the filesystem document store
//! and the PDF extractor behind the router, with only the model mocked.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use cvlens_core::{
    config::{DatabaseConfig, ServerConfig, StorageConfig},
    testing::MockLlmClient,
    AnalysisProcessor, AnalysisScheduler, AnalysisStore, Config, DocumentStore, FsDocumentStore,
    NotificationStore, Notifier, PdfTextExtractor, SchedulerConfig, SqliteAnalysisStore,
    SqliteNotificationStore,
};

/// Re-export fixtures for test convenience
pub use cvlens_core::testing::fixtures;

/// How long a test waits for queued analyses to finish.
pub const SETTLE: Duration = Duration::from_secs(10);

/// Test fixture running the API over real stores and a mock model.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock model - queue replies and faults
    pub llm: Arc<MockLlmClient>,
    /// Scheduler driving queued analyses
    pub scheduler: Arc<AnalysisScheduler>,
    /// Temporary directory for the database and documents
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let documents_dir = temp_dir.path().join("documents");

        let mut config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            storage: StorageConfig {
                documents_dir: documents_dir.clone(),
            },
            llm: Default::default(),
            pipeline: Default::default(),
            notifications: Default::default(),
            scheduler: SchedulerConfig {
                initial_delay_ms: 10,
                max_delay_ms: 50,
                recover_on_start: false,
                ..Default::default()
            },
            logging: Default::default(),
        };
        config.llm.api_key = Some("test-secret-key".to_string());

        let analyses: Arc<dyn AnalysisStore> = Arc::new(
            SqliteAnalysisStore::new(&db_path).expect("Failed to create analysis store"),
        );
        let notifications: Arc<dyn NotificationStore> = Arc::new(
            SqliteNotificationStore::new(&db_path).expect("Failed to create notification store"),
        );
        let documents: Arc<dyn DocumentStore> = Arc::new(
            FsDocumentStore::new(&documents_dir).expect("Failed to create document store"),
        );
        let llm = Arc::new(MockLlmClient::new());

        let processor = AnalysisProcessor::new(
            Arc::clone(&analyses),
            Arc::new(PdfTextExtractor::new(Arc::clone(&documents))),
            llm.clone(),
            Notifier::new(Arc::clone(&notifications), config.notifications.clone()),
            config.pipeline.clone(),
        );
        let scheduler = Arc::new(AnalysisScheduler::new(
            config.scheduler.clone(),
            config.pipeline.max_attempts,
            Arc::new(processor),
            Arc::clone(&analyses),
        ));
        scheduler.start().await;

        let state = Arc::new(cvlens_server::state::AppState::new(
            config,
            analyses,
            notifications,
            documents,
            Arc::clone(&scheduler),
        ));
        let router = cvlens_server::api::create_router(state);

        Self {
            router,
            llm,
            scheduler,
            temp_dir,
        }
    }

    /// Wait until every queued analysis has finished.
    pub async fn settle(&self) {
        assert!(
            self.scheduler.wait_idle(SETTLE).await,
            "scheduler did not settle"
        );
    }

    /// Upload a PDF and return the created analysis id.
    pub async fn upload(&self, pdf: Vec<u8>) -> String {
        let response = self.post_bytes("/api/v1/analyses?filename=cv.pdf", pdf).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "upload failed: {}",
            response.text
        );
        response.body["id"]
            .as_str()
            .expect("analysis id missing")
            .to_string()
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, Body::empty(), None).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path, Body::empty(), None).await
    }

    /// Send a POST request with a raw document body.
    pub async fn post_bytes(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("POST", path, Body::from(body), Some("application/pdf"))
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, Body::empty(), None).await
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            request_builder = request_builder.header("Content-Type", content_type);
        }
        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
