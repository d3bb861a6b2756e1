//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "mvgen_worker_jobs_started_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mvgen_worker_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "mvgen_worker_job_duration_seconds";
    pub const JOB_ATTEMPTS_FAILED_TOTAL: &str = "mvgen_worker_job_attempts_failed_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "mvgen_worker_jobs_dead_lettered_total";
    pub const POLL_ATTEMPTS_TOTAL: &str = "mvgen_worker_poll_attempts_total";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "mvgen_worker_download_duration_seconds";
    pub const RENDER_DURATION_SECONDS: &str = "mvgen_worker_render_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "mvgen_worker_upload_duration_seconds";
    pub const CLIPS_DISCARDED_TOTAL: &str = "mvgen_worker_clips_discarded_total";
}

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_started(kind: &'static str) {
    counter!(names::JOBS_STARTED_TOTAL, "kind" => kind).increment(1);
}

/// `outcome` is `succeeded`, `failed` or `skipped`.
pub fn record_job_finished(kind: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_FINISHED_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind).record(duration_secs);
}

pub fn record_attempt_failed(kind: &'static str) {
    counter!(names::JOB_ATTEMPTS_FAILED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_dead_lettered(kind: &'static str) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_poll(service: &'static str) {
    counter!(names::POLL_ATTEMPTS_TOTAL, "service" => service).increment(1);
}

pub fn record_download(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_render(duration_secs: f64) {
    histogram!(names::RENDER_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_clips_discarded(count: usize) {
    counter!(names::CLIPS_DISCARDED_TOTAL).increment(count as u64);
}
