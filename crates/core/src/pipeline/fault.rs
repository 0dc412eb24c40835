//! Typed processing faults and their retry disposition.

use thiserror::Error;

use crate::analysis::{AnalysisStatus, AnalysisStoreError};
use crate::document::ExtractionError;
use crate::llm::LlmError;

/// What the scheduler should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the job silently; there is nothing to retry or report.
    Discard,
    /// The record is terminally failed; do not retry.
    GiveUp,
    /// Another attempt may succeed.
    Retry,
}

/// A fault raised by [`AnalysisProcessor::process`](super::AnalysisProcessor::process).
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error("Analysis not found: {analysis_id}")]
    NotFound { analysis_id: String },

    #[error("Analysis {analysis_id} is already {status}")]
    AlreadyTerminal {
        analysis_id: String,
        status: AnalysisStatus,
    },

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Model(#[from] LlmError),

    #[error("{0}")]
    Store(#[from] AnalysisStoreError),

    #[error("Attempt budget exhausted after {attempts} attempts")]
    Exhausted { analysis_id: String, attempts: u32 },
}

impl PipelineFault {
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineFault::NotFound { .. } | PipelineFault::AlreadyTerminal { .. } => {
                Disposition::Discard
            }
            PipelineFault::Extraction(e) if !e.is_retryable() => Disposition::GiveUp,
            PipelineFault::Exhausted { .. } => Disposition::GiveUp,
            PipelineFault::Extraction(_)
            | PipelineFault::Model(_)
            | PipelineFault::Store(_) => Disposition::Retry,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retry
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineFault::NotFound { .. } => "not_found",
            PipelineFault::AlreadyTerminal { .. } => "already_terminal",
            PipelineFault::Extraction(_) => "extraction",
            PipelineFault::Model(_) => "model",
            PipelineFault::Store(_) => "store",
            PipelineFault::Exhausted { .. } => "exhausted",
        }
    }
}
