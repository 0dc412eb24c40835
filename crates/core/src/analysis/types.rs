//! Analysis record and status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::DocumentRef;

/// Processing status of an analysis record.
///
/// ```text
/// Pending -> Processing -> Completed
///                \-> Failed -> Processing (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    /// Returns the status as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AnalysisStatus::Pending),
            "processing" => Some(AnalysisStatus::Processing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if the pipeline may move a record from `self` to `next`.
    ///
    /// `Processing -> Processing` covers re-entering an attempt after a worker
    /// crash. Whether a `Failed` record still has attempts left is decided by
    /// the processor, not here.
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Failed, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// `Completed` never moves again.
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisStatus::Completed)
    }

    /// Returns true while the record waits for or is in a processing attempt.
    pub fn is_open(&self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Processing)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-upload analysis record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: String,
    pub status: AnalysisStatus,
    /// Reference to the uploaded document bytes.
    pub document: DocumentRef,
    /// Text extracted during the latest successful extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Structured model output. Present only when `status == Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<Value>,
    /// Present only when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Number of processing attempts started so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn has_results(&self) -> bool {
        self.status.is_completed() && self.analysis_result.is_some()
    }

    /// Returns true if the field invariants hold for the current status.
    pub fn is_consistent(&self) -> bool {
        let result_ok = self.analysis_result.is_some() == (self.status == AnalysisStatus::Completed);
        let error_ok = self.error_message.is_some() == (self.status == AnalysisStatus::Failed);
        result_ok && error_ok
    }
}

/// A state transition applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisUpdate {
    /// Enter `Processing`, bump `attempts`, clear result and error.
    StartAttempt,
    /// Persist extracted text; record must be `Processing`.
    ExtractedText(String),
    /// Enter `Completed` with the parsed result.
    Complete(Value),
    /// Enter `Failed` with an error message.
    Fail(String),
}

impl AnalysisUpdate {
    /// Statuses the record must currently be in for this update to apply.
    pub fn allowed_from(&self) -> &'static [AnalysisStatus] {
        use AnalysisStatus::*;
        match self {
            AnalysisUpdate::StartAttempt => &[Pending, Processing, Failed],
            AnalysisUpdate::ExtractedText(_) => &[Processing],
            AnalysisUpdate::Complete(_) => &[Processing],
            AnalysisUpdate::Fail(_) => &[Processing],
        }
    }

    /// Status after the update is applied.
    pub fn target_status(&self) -> AnalysisStatus {
        match self {
            AnalysisUpdate::StartAttempt | AnalysisUpdate::ExtractedText(_) => {
                AnalysisStatus::Processing
            }
            AnalysisUpdate::Complete(_) => AnalysisStatus::Completed,
            AnalysisUpdate::Fail(_) => AnalysisStatus::Failed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisUpdate::StartAttempt => "start_attempt",
            AnalysisUpdate::ExtractedText(_) => "store_extracted_text",
            AnalysisUpdate::Complete(_) => "complete",
            AnalysisUpdate::Fail(_) => "fail",
        }
    }
}
