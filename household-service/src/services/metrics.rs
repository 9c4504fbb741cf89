//! Prometheus metrics for household-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Recorder behind the `metrics` facade used by the HTTP middleware.
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Entry mutation counter by operation and outcome.
pub static ENTRIES_MUTATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "household_entries_mutated_total",
        "Total number of ledger entry mutations",
        &["operation", "status"]
    )
    .expect("Failed to register entries_mutated_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "household_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Rows touched by balance/id cascades.
pub static CASCADE_ROWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "household_cascade_rows_total",
        "Total number of later entries rewritten by cascades",
        &["operation"]
    )
    .expect("Failed to register cascade_rows_total")
});

/// Datastore operation duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "household_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics and install the `metrics` recorder.
///
/// Safe to call more than once; only the first call installs the recorder.
pub fn init_metrics() {
    if let Err(e) = METRICS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder()) {
        tracing::warn!(error = %e, "Failed to install Prometheus recorder, HTTP metrics disabled");
    }

    Lazy::force(&ENTRIES_MUTATED_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&CASCADE_ROWS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format: the ledger registry followed by the
/// HTTP series recorded through the `metrics` facade.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut output = encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default();

    if let Some(handle) = METRICS_HANDLE.get() {
        output.push_str(&handle.render());
    }

    output
}
