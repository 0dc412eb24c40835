//! Analysis API handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use cvlens_core::{
    looks_like_pdf, AnalysisFilter, AnalysisRecord, AnalysisStatus, AnalysisStoreError,
    CreateAnalysisRequest, SubjectRef, PDF_CONTENT_TYPE,
};

use crate::state::AppState;

/// Maximum allowed limit for analysis queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for analysis queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for uploading a document
#[derive(Debug, Deserialize)]
pub struct CreateAnalysisParams {
    /// Original file name, kept for display
    pub filename: Option<String>,
}

/// Query parameters for listing analyses
#[derive(Debug, Deserialize)]
pub struct ListAnalysesParams {
    /// Comma-separated statuses to include
    pub status: Option<String>,
    /// Maximum number of analyses to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for analysis operations
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub id: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content_type: String,
    pub byte_size: u64,
    pub attempts: u32,
    pub has_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AnalysisResponse {
    /// Full record, extracted text included.
    fn detail(record: AnalysisRecord) -> Self {
        let extracted_text = record.extracted_text.clone();
        Self {
            extracted_text,
            ..Self::summary(record)
        }
    }

    /// Record without the extracted text.
    fn summary(record: AnalysisRecord) -> Self {
        Self {
            has_results: record.has_results(),
            id: record.id,
            status: record.status,
            filename: record.document.filename,
            content_type: record.document.content_type,
            byte_size: record.document.byte_size,
            attempts: record.attempts,
            analysis_result: record.analysis_result,
            error_message: record.error_message,
            extracted_text: None,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing analyses
#[derive(Debug, Serialize)]
pub struct ListAnalysesResponse {
    pub analyses: Vec<AnalysisResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct AnalysisErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<AnalysisErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(AnalysisErrorResponse {
            error: error.into(),
        }),
    )
}

fn store_error(id: &str, e: AnalysisStoreError) -> ApiError {
    match e {
        AnalysisStoreError::NotFound(_) => {
            api_error(StatusCode::NOT_FOUND, format!("Analysis not found: {}", id))
        }
        e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload a PDF and queue it for analysis
pub async fn create_analysis(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateAnalysisParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<AnalysisResponse>), ApiError> {
    if body.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "document is required"));
    }
    if !looks_like_pdf(&body) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "document must be a PDF file",
        ));
    }

    let document = state
        .documents()
        .put(body.to_vec(), params.filename, PDF_CONTENT_TYPE)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let record = match state.analyses().create(CreateAnalysisRequest {
        document: document.clone(),
    }) {
        Ok(record) => record,
        Err(e) => {
            if let Err(cleanup) = state.documents().delete(&document).await {
                warn!(key = %document.key, error = %cleanup, "Failed to remove orphaned document");
            }
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    info!(analysis_id = %record.id, byte_size = document.byte_size, "Analysis created");
    if !state.scheduler().enqueue(&record.id) {
        warn!(analysis_id = %record.id, "Analysis not enqueued, left pending");
    }

    Ok((StatusCode::CREATED, Json(AnalysisResponse::detail(record))))
}

/// Get an analysis by ID
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    match state.analyses().get(&id) {
        Ok(Some(record)) => Ok(Json(AnalysisResponse::detail(record))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Analysis not found: {}", id),
        )),
        Err(e) => Err(store_error(&id, e)),
    }
}

/// List analyses, newest first
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListAnalysesParams>,
) -> Result<Json<ListAnalysesResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = AnalysisFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref statuses) = params.status {
        for value in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let status = AnalysisStatus::parse(value).ok_or_else(|| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown status: {}", value),
                )
            })?;
            filter = filter.with_status(status);
        }
    }

    let analyses = state
        .analyses()
        .list(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Get total count (without pagination)
    let total = state
        .analyses()
        .count(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListAnalysesResponse {
        analyses: analyses.into_iter().map(AnalysisResponse::summary).collect(),
        total,
        limit,
        offset,
    }))
}

/// Delete an analysis, its notifications and the stored document
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let record = state.analyses().delete(&id).map_err(|e| store_error(&id, e))?;

    match state
        .notifications()
        .delete_for_subject(&SubjectRef::analysis(&id))
    {
        Ok(removed) => info!(analysis_id = %id, notifications = removed, "Analysis deleted"),
        Err(e) => warn!(analysis_id = %id, error = %e, "Failed to delete notifications"),
    }

    if let Err(e) = state.documents().delete(&record.document).await {
        warn!(analysis_id = %id, error = %e, "Failed to delete stored document");
    }

    Ok(Json(AnalysisResponse::summary(record)))
}
