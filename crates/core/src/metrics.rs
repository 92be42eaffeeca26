//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Download sessions (starts, outcomes, duration, stalls)
//! - Delivery (archives built)
//! - Storage cleanup (deferred deletions, periodic sweeps)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Session Metrics
// =============================================================================

/// Sessions started by tool and privilege.
pub static SESSIONS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiograb_sessions_started_total", "Total download sessions started"),
        &["tool", "privilege"], // privilege: "anonymous", "admin"
    )
    .unwrap()
});

/// Sessions finished by terminal outcome.
pub static SESSION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_session_outcomes_total",
            "Download sessions by terminal outcome",
        ),
        &["outcome"],
    )
    .unwrap()
});

/// Session wall-clock duration in seconds.
pub static SESSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "audiograb_session_duration_seconds",
            "Duration of download sessions",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["tool"],
    )
    .unwrap()
});

/// Sessions killed for producing no output.
pub static STALL_KILLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiograb_stall_kills_total",
        "Download processes killed after going idle",
    )
    .unwrap()
});

/// Tool launches that failed before any output.
pub static LAUNCH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiograb_launch_failures_total", "Failed tool launches"),
        &["tool"],
    )
    .unwrap()
});

// =============================================================================
// Delivery Metrics
// =============================================================================

/// Archives built for multi-file deliveries.
pub static ARCHIVES_BUILT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiograb_archives_built_total",
        "Zip archives built for multi-file deliveries",
    )
    .unwrap()
});

// =============================================================================
// Cleanup Metrics
// =============================================================================

/// Deferred session directory deletions by result.
pub static DEFERRED_DELETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_deferred_deletions_total",
            "Deferred session directory deletions",
        ),
        &["result"], // "removed", "failed", "cancelled"
    )
    .unwrap()
});

/// Sweeper runs.
pub static SWEEPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("audiograb_sweeps_total", "Periodic sweeper runs").unwrap()
});

/// Entries handled by the sweeper by result.
pub static SWEPT_ENTRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_swept_entries_total",
            "Storage entries handled by the periodic sweeper",
        ),
        &["result"], // "removed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Sessions
        Box::new(SESSIONS_STARTED.clone()),
        Box::new(SESSION_OUTCOMES.clone()),
        Box::new(SESSION_DURATION.clone()),
        Box::new(STALL_KILLS.clone()),
        Box::new(LAUNCH_FAILURES.clone()),
        // Delivery
        Box::new(ARCHIVES_BUILT.clone()),
        // Cleanup
        Box::new(DEFERRED_DELETIONS.clone()),
        Box::new(SWEEPS_TOTAL.clone()),
        Box::new(SWEPT_ENTRIES.clone()),
    ]
}
