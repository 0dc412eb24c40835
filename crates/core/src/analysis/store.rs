//! Analysis storage trait and types.

use std::fmt;

use crate::analysis::{AnalysisRecord, AnalysisStatus, AnalysisUpdate};
use crate::document::DocumentRef;

/// Error type for analysis store operations.
#[derive(Debug)]
pub enum AnalysisStoreError {
    /// Record not found.
    NotFound(String),
    /// The record was not in a status the update may be applied from.
    StaleState {
        analysis_id: String,
        current_status: AnalysisStatus,
        operation: &'static str,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for AnalysisStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStoreError::NotFound(id) => write!(f, "Analysis not found: {}", id),
            AnalysisStoreError::StaleState {
                analysis_id,
                current_status,
                operation,
            } => write!(
                f,
                "Cannot {} analysis {}: current status is {}",
                operation, analysis_id, current_status
            ),
            AnalysisStoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisStoreError {}

/// Request to create a new analysis record.
#[derive(Debug, Clone)]
pub struct CreateAnalysisRequest {
    pub document: DocumentRef,
}

/// Filter for querying analysis records.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter {
    /// Match any of these statuses (empty = all).
    pub statuses: Vec<AnalysisStatus>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl AnalysisFilter {
    pub fn new() -> Self {
        Self {
            statuses: Vec::new(),
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: AnalysisStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Records waiting for or in a processing attempt.
    pub fn open() -> Self {
        Self::new()
            .with_status(AnalysisStatus::Pending)
            .with_status(AnalysisStatus::Processing)
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for analysis storage backends.
///
/// Single-record reads and writes only; `apply` must be atomic with respect
/// to the status check so that overlapping attempts cannot lose updates.
pub trait AnalysisStore: Send + Sync {
    /// Create a new `Pending` record.
    fn create(&self, request: CreateAnalysisRequest) -> Result<AnalysisRecord, AnalysisStoreError>;

    /// Get a record by ID.
    fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, AnalysisStoreError>;

    /// List records matching the filter, newest first.
    fn list(&self, filter: &AnalysisFilter) -> Result<Vec<AnalysisRecord>, AnalysisStoreError>;

    /// Count records matching the filter.
    fn count(&self, filter: &AnalysisFilter) -> Result<i64, AnalysisStoreError>;

    /// Apply a transition with compare-and-set on the current status.
    fn apply(&self, id: &str, update: AnalysisUpdate)
        -> Result<AnalysisRecord, AnalysisStoreError>;

    /// Permanently delete a record. Returns the deleted record.
    fn delete(&self, id: &str) -> Result<AnalysisRecord, AnalysisStoreError>;
}
