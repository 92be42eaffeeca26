//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the audiograb server:
//! - HTTP request metrics (latency, counts, errors)
//! - Progress stream and file delivery metrics
//! - Engine and login status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

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
            "audiograb_http_request_duration_seconds",
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
        Opts::new("audiograb_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiograb_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Stream and Delivery Metrics
// =============================================================================

/// Progress streams currently open.
pub static PROGRESS_STREAMS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiograb_progress_streams_active",
        "Number of open download progress streams",
    )
    .unwrap()
});

/// Progress events sent by kind.
pub static PROGRESS_EVENTS_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_progress_events_sent_total",
            "Progress stream events sent",
        ),
        &["kind"], // "progress", "delivery", "complete", "error"
    )
    .unwrap()
});

/// Delivered files served.
pub static FILES_SERVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiograb_files_served_total",
        "Delivered files and archives served",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Engine running state (1 = running, 0 = stopped).
pub static ENGINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiograb_engine_running",
        "Whether the download engine is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Download sessions in progress.
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiograb_sessions_active",
        "Number of download sessions in progress",
    )
    .unwrap()
});

/// Admin login sessions held in memory.
pub static LOGINS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("audiograb_logins_active", "Number of active admin logins").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Streams and delivery
    registry
        .register(Box::new(PROGRESS_STREAMS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(PROGRESS_EVENTS_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(FILES_SERVED_TOTAL.clone()))
        .unwrap();

    // Engine
    registry.register(Box::new(ENGINE_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .unwrap();
    registry.register(Box::new(LOGINS_ACTIVE.clone())).unwrap();

    // Core metrics (sessions, delivery, cleanup)
    for metric in audiograb_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the engine and the login store.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status();
    ENGINE_RUNNING.set(if status.running { 1 } else { 0 });
    SESSIONS_ACTIVE.set(status.active_sessions as i64);
    LOGINS_ACTIVE.set(state.sessions().count().await as i64);
}

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static NUMERIC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
///
/// Delivered file names are collapsed as well, they are unbounded.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with("/downloads/") {
        return "/downloads/{id}/{file}".to_string();
    }

    let result = UUID_REGEX.replace_all(path, "{id}");
    let result = NUMERIC_REGEX.replace_all(&result, "/{id}$1");
    result.to_string()
}
