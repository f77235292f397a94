//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming conventions. Recording
//! is a no-op until a recorder (e.g. the Prometheus exporter) is installed.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all CiteForge metrics
pub const METRICS_PREFIX: &str = "citeforge";

/// Buckets for LLM latency (in seconds)
pub const LLM_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 2min
];

/// Buckets for whole-run latency (in seconds)
pub const RUN_BUCKETS: &[f64] = &[
    1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0, 120.0, 300.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Run metrics
    describe_counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total orchestration runs by outcome"
    );

    describe_histogram!(
        format!("{}_run_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end run latency in seconds"
    );

    describe_counter!(
        format!("{}_rounds_total", METRICS_PREFIX),
        Unit::Count,
        "Answering rounds executed"
    );

    // Cycle metrics
    describe_counter!(
        format!("{}_cycles_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-question cycles by sufficiency verdict"
    );

    describe_counter!(
        format!("{}_cycles_degraded_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-question cycles that degraded after a failure"
    );

    describe_histogram!(
        format!("{}_cycle_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Sub-question cycle latency in seconds"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM requests by purpose and status"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM request latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total search requests by status"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search request latency in seconds"
    );

    describe_histogram!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Sections returned per search request"
    );

    // Citation metrics
    describe_counter!(
        format!("{}_citations_assigned_total", METRICS_PREFIX),
        Unit::Count,
        "Citation numbers assigned"
    );

    tracing::info!("Metrics registered");
}

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

/// Helper to record run metrics
pub fn record_run(duration_secs: f64, outcome: &str, rounds: u32) {
    counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(format!("{}_rounds_total", METRICS_PREFIX)).increment(rounds as u64);

    histogram!(format!("{}_run_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record cycle metrics
pub fn record_cycle(duration_secs: f64, verdict: &str, degraded: bool) {
    counter!(
        format!("{}_cycles_total", METRICS_PREFIX),
        "verdict" => verdict.to_string()
    )
    .increment(1);

    if degraded {
        counter!(format!("{}_cycles_degraded_total", METRICS_PREFIX)).increment(1);
    }

    histogram!(format!("{}_cycle_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record LLM call metrics
pub fn record_llm_call(duration_secs: f64, purpose: &str, success: bool) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "purpose" => purpose.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "purpose" => purpose.to_string()
    )
    .record(duration_secs);
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, result_count: usize, success: bool) {
    counter!(
        format!("{}_search_requests_total", METRICS_PREFIX),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
        histogram!(format!("{}_search_results_count", METRICS_PREFIX)).record(result_count as f64);
    }
}

/// Helper to record newly assigned citation numbers
pub fn record_citations(assigned: usize) {
    if assigned > 0 {
        counter!(format!("{}_citations_assigned_total", METRICS_PREFIX)).increment(assigned as u64);
    }
}
