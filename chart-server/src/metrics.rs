//! Request and index metrics, published through the `metrics` facade.
//!
//! Without an installed recorder every call here is a no-op, so the router and
//! cache record unconditionally and the binary decides whether anything is
//! exported.

use axum::http::StatusCode;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::router::RequestLabels;

pub const REQUESTS_TOTAL: &str = "chart_server_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "chart_server_request_duration_seconds";
pub const INDEX_REGENERATIONS_TOTAL: &str = "chart_server_index_regenerations_total";

static DESCRIBED: OnceLock<()> = OnceLock::new();

fn describe() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(REQUESTS_TOTAL, "Total HTTP requests handled");
        describe_histogram!(
            REQUEST_DURATION_SECONDS,
            "HTTP request latency in seconds"
        );
        describe_counter!(
            INDEX_REGENERATIONS_TOTAL,
            "Repository index regeneration waves by outcome"
        );
    });
}

/// Install the Prometheus recorder and return a handle for rendering `/metrics`.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    describe();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Record one handled request.
pub fn record_request(labels: &RequestLabels, status: StatusCode, elapsed: Duration) {
    let labels: Vec<(&'static str, String)> = vec![
        ("method", labels.method.clone()),
        ("classification", labels.classification_label().to_string()),
        ("path", labels.path.clone()),
        ("status", status.as_u16().to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

/// Record the end of a regeneration wave: `success`, `failure` or `interrupted`.
pub fn record_regeneration(outcome: &'static str) {
    counter!(INDEX_REGENERATIONS_TOTAL, "outcome" => outcome).increment(1);
}
