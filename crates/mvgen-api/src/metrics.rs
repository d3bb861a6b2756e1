//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mvgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mvgen_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mvgen_http_requests_in_flight";

    // Pipeline metrics
    pub const PIPELINES_SUBMITTED_TOTAL: &str = "mvgen_pipelines_submitted_total";
    pub const CLIP_JOBS_SUBMITTED_TOTAL: &str = "mvgen_clip_jobs_submitted_total";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "mvgen_submissions_rejected_total";
    pub const LYRICS_REQUESTS_TOTAL: &str = "mvgen_lyrics_requests_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "mvgen_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_pipeline_submitted(clip_jobs: usize) {
    counter!(names::PIPELINES_SUBMITTED_TOTAL).increment(1);
    counter!(names::CLIP_JOBS_SUBMITTED_TOTAL).increment(clip_jobs as u64);
}

pub fn record_submission_rejected() {
    counter!(names::SUBMISSIONS_REJECTED_TOTAL).increment(1);
}

/// `outcome` is `ok` or `failed`.
pub fn record_lyrics_request(outcome: &'static str) {
    counter!(names::LYRICS_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Replace job ids in a path so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let sanitized = if previous == "jobs" && !segment.is_empty() {
                ":job_id"
            } else {
                segment
            };
            previous = segment;
            sanitized
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
