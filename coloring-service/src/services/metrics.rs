//! Metrics collection and Prometheus export.
//!
//! Installs the Prometheus recorder and records one sample per generation
//! attempt; the rendered text is served on the ops `/metrics` endpoint.

use crate::services::invoker::Outcome;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Safe to call more than once; only the first call installs the recorder.
/// Panics if another global recorder was installed outside this module.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    });
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_invocation(outcome: Outcome, elapsed: Duration) {
    let labels = [("outcome", outcome.as_str())];
    counter!("coloring_invocations_total", &labels).increment(1);
    histogram!("coloring_invocation_duration_seconds", &labels).record(elapsed.as_secs_f64());
}
