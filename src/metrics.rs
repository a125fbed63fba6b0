use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, TextEncoder,
};
use std::time::Instant;

use crate::{DashboardError, Result};

lazy_static! {
    pub static ref DASHBOARD_UP: IntGauge = register_int_gauge!(
        "dashboard_up",
        "Whether the dashboard process is serving (1) or not (0)"
    ).unwrap();

    // Fetch metrics
    pub static ref FETCH_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "metric_fetch_requests_total",
        "Total number of metric batches submitted to the source",
        &["resource"]
    ).unwrap();

    pub static ref FETCH_FAILURES: IntCounterVec = register_int_counter_vec!(
        "metric_fetch_failures_total",
        "Total number of failed metric batches",
        &["resource", "kind"]
    ).unwrap();

    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "metric_fetch_duration_seconds",
        "Metric batch round trip in seconds",
        &["resource"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
    ).unwrap();

    pub static ref FETCH_RETRIES: IntCounterVec = register_int_counter_vec!(
        "metric_fetch_retries_total",
        "Total number of retries after throttling",
        &["resource"]
    ).unwrap();

    // Refresh metrics
    pub static ref STALE_RESULTS: IntCounterVec = register_int_counter_vec!(
        "refresh_stale_results_total",
        "Completed refreshes discarded because a newer one was already applied",
        &["resource"]
    ).unwrap();

    pub static ref APPLIED_GENERATION: IntGaugeVec = register_int_gauge_vec!(
        "refresh_applied_generation",
        "Generation of the refresh currently displayed",
        &["resource"]
    ).unwrap();

    pub static ref MALFORMED_RESULTS: IntCounter = register_int_counter!(
        "metric_malformed_results_total",
        "Results whose timestamps and values could not be paired"
    ).unwrap();
}

pub fn init_metrics() {
    DASHBOARD_UP.set(1);
}

/// Counts a fetch and observes its duration when dropped.
pub struct FetchTimer {
    resource: String,
    start: Instant,
}

impl FetchTimer {
    pub fn new(resource: &str) -> Self {
        FETCH_REQUESTS.with_label_values(&[resource]).inc();
        Self {
            resource: resource.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for FetchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        FETCH_DURATION
            .with_label_values(&[self.resource.as_str()])
            .observe(duration);
    }
}

pub fn record_fetch_failure(resource: &str, kind: &str) {
    FETCH_FAILURES.with_label_values(&[resource, kind]).inc();
}

pub fn record_retry(resource: &str) {
    FETCH_RETRIES.with_label_values(&[resource]).inc();
}

pub fn record_stale_result(resource: &str) {
    STALE_RESULTS.with_label_values(&[resource]).inc();
}

pub fn set_applied_generation(resource: &str, generation: u64) {
    APPLIED_GENERATION
        .with_label_values(&[resource])
        .set(i64::try_from(generation).unwrap_or(i64::MAX));
}

pub fn record_malformed_result() {
    MALFORMED_RESULTS.inc();
}

/// Renders the default registry in the text exposition format.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| DashboardError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| DashboardError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        init_metrics();
        {
            let _timer = FetchTimer::new("metrics-test");
        }
        record_fetch_failure("metrics-test", "throttled");
        record_stale_result("metrics-test");
        set_applied_generation("metrics-test", 7);

        assert!(FETCH_REQUESTS.with_label_values(&["metrics-test"]).get() >= 1);

        let text = gather_text().unwrap();
        assert!(text.contains("dashboard_up 1"));
        assert!(text.contains("metric_fetch_failures_total"));
        assert!(text.contains("refresh_applied_generation{resource=\"metrics-test\"} 7"));
    }
}
