//! Structured job logging.
//!
//! Every event carries the job id, the pipeline it belongs to and the
//! operation, so one pipeline can be followed across workers.

use std::time::Duration;

use tracing::{error, info, warn, Span};

use mvgen_models::JobId;

/// Job logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    pipeline_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, pipeline_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            pipeline_id: pipeline_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    /// Terminal domain failure of the job.
    pub fn log_failure(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job failed: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    /// Duration of one named step.
    pub fn log_timing(&self, step: &str, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation,
            step = step,
            elapsed_ms = elapsed.as_millis() as u64,
            "Step finished"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span wrapping the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            pipeline_id = %self.pipeline_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::new();
        let pipeline_id = JobId::new();
        let logger = JobLogger::new(&job_id, &pipeline_id, "clip_synthesis");

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.pipeline_id(), pipeline_id.as_str());
        assert_eq!(logger.operation(), "clip_synthesis");
    }
}
