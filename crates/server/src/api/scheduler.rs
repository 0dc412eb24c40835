//! Scheduler API handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use cvlens_core::SchedulerStats;

use crate::state::AppState;

/// Current scheduler statistics
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<SchedulerStats> {
    Json(state.scheduler().stats())
}
