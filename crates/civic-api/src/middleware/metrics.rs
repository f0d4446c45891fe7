//! # Prometheus Metrics
//!
//! Request counters and latency histograms recorded through the `metrics`
//! facade. When no recorder is installed the macros are no-ops, so tests
//! and embedders pay nothing.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Requests served, labelled by method and status code.
pub const HTTP_REQUESTS_TOTAL: &str = "civic_http_requests_total";
/// Request latency in seconds, labelled by method.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "civic_http_request_duration_seconds";

/// Install the global Prometheus recorder and return the scrape handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Middleware that counts requests and records latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method)
        .record(started.elapsed().as_secs_f64());

    response
}
