//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Analysis processing (outcomes, durations, scheduler retries)
//! - Model clients (requests, latency, tokens, transport retries)
//! - Response parsing and notifications

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Processing Metrics
// =============================================================================

/// Processing attempts total by outcome.
pub static ANALYSES_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cvlens_analyses_processed_total",
            "Total processing attempts by outcome",
        ),
        &["result"], // "completed", "failed", "discarded"
    )
    .unwrap()
});

/// Processing attempt duration in seconds.
pub static PROCESSING_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cvlens_processing_duration_seconds",
            "Duration of a processing attempt",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["result"],
    )
    .unwrap()
});

/// Attempts re-scheduled after a transient failure.
pub static SCHEDULER_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cvlens_scheduler_retries_total",
        "Total analysis attempts re-scheduled after a transient failure",
    )
    .unwrap()
});

/// Model responses that needed the raw-text fallback.
pub static PARSER_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cvlens_parser_fallbacks_total",
        "Total model responses stored as raw-text fallback",
    )
    .unwrap()
});

/// Notifications created by kind.
pub static NOTIFICATIONS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cvlens_notifications_created_total",
            "Total notifications created",
        ),
        &["kind"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Model Client Metrics
// =============================================================================

/// Model requests total by provider and result.
pub static LLM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cvlens_llm_requests_total", "Total model requests"),
        &["provider", "result"], // result: "success" or an error kind
    )
    .unwrap()
});

/// Model request latency in seconds.
pub static LLM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cvlens_llm_request_duration_seconds",
            "Model request latency",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider"],
    )
    .unwrap()
});

/// Connect/timeout faults retried inside the transport.
pub static LLM_TRANSPORT_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cvlens_llm_transport_retries_total",
            "Total transport-level retries of model requests",
        ),
        &["provider"],
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cvlens_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Processing
        Box::new(ANALYSES_PROCESSED.clone()),
        Box::new(PROCESSING_DURATION.clone()),
        Box::new(SCHEDULER_RETRIES.clone()),
        Box::new(PARSER_FALLBACKS.clone()),
        Box::new(NOTIFICATIONS_CREATED.clone()),
        // Model clients
        Box::new(LLM_REQUESTS.clone()),
        Box::new(LLM_REQUEST_DURATION.clone()),
        Box::new(LLM_TRANSPORT_RETRIES.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
