//! Notification API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use cvlens_core::{Notification, NotificationError, NotificationFilter};

use crate::state::AppState;

/// Maximum allowed limit for notification queries
const MAX_LIMIT: i64 = 500;

/// Default limit for notification queries
const DEFAULT_LIMIT: i64 = 50;

/// Query parameters for listing notifications
#[derive(Debug, Deserialize)]
pub struct ListNotificationsParams {
    /// Only unread notifications
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing notifications
#[derive(Debug, Serialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct NotificationErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<NotificationErrorResponse>);

fn to_api_error(e: NotificationError) -> ApiError {
    let status = match e {
        NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
        NotificationError::Validation(_) => StatusCode::BAD_REQUEST,
        NotificationError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(NotificationErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// List notifications, newest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListNotificationsParams>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = NotificationFilter::new()
        .with_limit(limit)
        .with_offset(offset);
    if params.unread {
        filter = filter.unread();
    }

    let store = state.notifications();
    let notifications = store.list(&filter).map_err(to_api_error)?;
    let unread_count = store.unread_count().map_err(to_api_error)?;

    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
        limit,
        offset,
    }))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.notifications().unread_count().map_err(to_api_error)?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    state
        .notifications()
        .mark_read(&id)
        .map(Json)
        .map_err(to_api_error)
}

pub async fn mark_unread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    state
        .notifications()
        .mark_unread(&id)
        .map(Json)
        .map_err(to_api_error)
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state.notifications().mark_all_read().map_err(to_api_error)?;
    Ok(Json(MarkAllReadResponse { updated }))
}
