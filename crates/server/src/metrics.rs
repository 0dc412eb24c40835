//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the cvlens server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Analysis and notification counts (collected dynamically)
//! - Scheduler activity (collected dynamically)
//!
//! Pipeline and model metrics live in `cvlens_core::metrics` and are
//! registered into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use cvlens_core::{AnalysisFilter, AnalysisStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cvlens_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cvlens_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cvlens_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Analysis Metrics (collected dynamically)
// =============================================================================

/// Analyses by current status.
pub static ANALYSES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("cvlens_analyses_by_status", "Current analysis count by status"),
        &["status"],
    )
    .unwrap()
});

/// Unread notifications.
pub static NOTIFICATIONS_UNREAD: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("cvlens_notifications_unread", "Number of unread notifications").unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cvlens_scheduler_running",
        "Whether the scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Attempts executing right now.
pub static SCHEDULER_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cvlens_scheduler_active",
        "Number of analysis attempts currently executing",
    )
    .unwrap()
});

/// Ids claimed by the scheduler (running, queued or in backoff).
pub static SCHEDULER_CLAIMED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cvlens_scheduler_claimed",
        "Number of analyses claimed by the scheduler",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Analyses
    registry
        .register(Box::new(ANALYSES_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(NOTIFICATIONS_UNREAD.clone()))
        .unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_CLAIMED.clone()))
        .unwrap();

    // Core metrics (pipeline, model clients, notifications)
    for metric in cvlens_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the stores and the scheduler.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let stats = state.scheduler().stats();
    SCHEDULER_RUNNING.set(if stats.running { 1 } else { 0 });
    SCHEDULER_ACTIVE.set(stats.active as i64);
    SCHEDULER_CLAIMED.set(stats.claimed as i64);

    if let Ok(unread) = state.notifications().unread_count() {
        NOTIFICATIONS_UNREAD.set(unread);
    }

    for status in [
        AnalysisStatus::Pending,
        AnalysisStatus::Processing,
        AnalysisStatus::Completed,
        AnalysisStatus::Failed,
    ] {
        let filter = AnalysisFilter::new().with_status(status);
        if let Ok(count) = state.analyses().count(&filter) {
            ANALYSES_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid(segment) || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
            {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid(segment: &str) -> bool {
    segment.len() == 36
        && segment.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/analyses/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/analyses/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_middle() {
        let path = "/api/v1/notifications/550e8400-e29b-41d4-a716-446655440000/read";
        assert_eq!(normalize_path(path), "/api/v1/notifications/{id}/read");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/analyses/12345"), "/api/v1/analyses/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/notifications/read_all"), "/api/v1/notifications/read_all");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("cvlens_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        cvlens_core::metrics::PARSER_FALLBACKS.inc_by(0);
        cvlens_core::metrics::SCHEDULER_RETRIES.inc_by(0);
        SCHEDULER_RUNNING.set(0);
        ANALYSES_BY_STATUS.with_label_values(&["pending"]).set(0);

        let output = encode_metrics();
        assert!(output.contains("cvlens_parser_fallbacks_total"));
        assert!(output.contains("cvlens_scheduler_retries_total"));
        assert!(output.contains("cvlens_scheduler_running"));
        assert!(output.contains("cvlens_analyses_by_status"));
    }
}
