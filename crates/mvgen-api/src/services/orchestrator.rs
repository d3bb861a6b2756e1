//! Job orchestration: validate, plan and submit pipelines; answer status queries.
//!
//! Validation and lyric filtering happen in [`PipelinePlan::build`], before
//! anything is written to Redis, so an invalid request never starts a partial
//! fan-out. Submission returns as soon as the jobs are queued.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use mvgen_models::{GenerationJob, GenerationRequest, JobId, StatusView};
use mvgen_queue::{PipelineGraph, PipelinePlan, QueueResult, SubmittedPipeline};

use crate::error::ApiResult;
use crate::metrics;

/// Storage and queues behind the orchestrator.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Record, open the barrier and fan out a planned pipeline.
    async fn submit(&self, plan: &PipelinePlan) -> QueueResult<SubmittedPipeline>;

    /// Current record of a job, if any.
    async fn record(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>>;

    /// Check that the backend answers.
    async fn ping(&self) -> QueueResult<()>;
}

#[async_trait]
impl JobBackend for PipelineGraph {
    async fn submit(&self, plan: &PipelinePlan) -> QueueResult<SubmittedPipeline> {
        PipelineGraph::submit(self, plan).await
    }

    async fn record(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        self.status().get(job_id).await
    }

    async fn ping(&self) -> QueueResult<()> {
        self.queue().ping().await
    }
}

/// Builds and submits the fan-out/join graph of each request.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn JobBackend>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self { backend }
    }

    /// Validate and submit a request. Never waits for the pipeline itself.
    pub async fn submit(&self, request: GenerationRequest) -> ApiResult<SubmittedPipeline> {
        let plan = match PipelinePlan::build(request) {
            Ok(plan) => plan,
            Err(e) => {
                metrics::record_submission_rejected();
                info!("Rejected generation request: {}", e.field_names());
                return Err(e.into());
            }
        };

        info!(
            pipeline_id = %plan.pipeline_id,
            requester_id = %plan.request.requester_id,
            clip_jobs = plan.clips.len(),
            "Submitting pipeline"
        );

        let submitted = self.backend.submit(&plan).await?;
        metrics::record_pipeline_submitted(submitted.clip_job_ids.len());
        Ok(submitted)
    }

    /// Status of any job id. Ids without a record are `Unknown`.
    pub async fn status(&self, job_id: &JobId) -> ApiResult<StatusView> {
        let record = self.backend.record(job_id).await?;
        Ok(StatusView::from_record(job_id, record.as_ref()))
    }

    pub async fn ping(&self) -> ApiResult<()> {
        Ok(self.backend.ping().await?)
    }
}
