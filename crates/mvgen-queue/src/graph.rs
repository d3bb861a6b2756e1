//! The fan-out/join graph of one generation request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use mvgen_models::{
    FailureDetail, FailureKind, FanOutResult, GenerationJob, GenerationRequest, JobId, JobKind,
    RequestValidationError,
};

use crate::barrier::{BarrierArrival, JoinBarrier};
use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::job::{AudioSynthesisJob, ClipSynthesisJob, QueueJob};
use crate::queue::JobQueue;
use crate::status::JobStatusStore;

/// Jobs for one validated request, not yet submitted.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub pipeline_id: JobId,
    pub request: GenerationRequest,
    pub audio: AudioSynthesisJob,
    /// One per filtered lyric line, in line order
    pub clips: Vec<ClipSynthesisJob>,
}

impl PipelinePlan {
    /// Validate the request and lay out its jobs.
    pub fn build(request: GenerationRequest) -> Result<Self, RequestValidationError> {
        let lines = request.validated_lines()?;
        let pipeline_id = JobId::new();

        let audio = AudioSynthesisJob::new(pipeline_id.clone(), &request);
        let clips = lines
            .into_iter()
            .map(|line| ClipSynthesisJob::new(pipeline_id.clone(), &request, line.ordinal, line.text))
            .collect();

        Ok(Self {
            pipeline_id,
            request,
            audio,
            clips,
        })
    }

    /// Fan-out members the barrier waits for.
    pub fn fan_out_count(&self) -> usize {
        1 + self.clips.len()
    }

    /// Pending records for every job, finishing included.
    pub fn records(&self) -> Vec<GenerationJob> {
        let mut records = Vec::with_capacity(self.fan_out_count() + 1);
        records.push(GenerationJob::new(
            self.pipeline_id.clone(),
            self.pipeline_id.clone(),
            JobKind::Finishing,
        ));
        records.push(GenerationJob::new(
            self.audio.job_id.clone(),
            self.pipeline_id.clone(),
            JobKind::AudioSynthesis,
        ));
        records.extend(self.clips.iter().map(|clip| {
            GenerationJob::new(clip.job_id.clone(), self.pipeline_id.clone(), JobKind::ClipSynthesis)
                .with_ordinal(clip.ordinal)
        }));
        records
    }
}

/// Identifiers handed back to the submitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedPipeline {
    /// Pipeline id, equal to the finishing job id
    pub job_id: JobId,
    pub audio_job_id: JobId,
    pub clip_job_ids: Vec<JobId>,
}

/// Queues, records and barrier behind the pipeline graph.
#[derive(Clone)]
pub struct PipelineGraph {
    queue: Arc<JobQueue>,
    status: Arc<JobStatusStore>,
    barrier: Arc<JoinBarrier>,
}

impl PipelineGraph {
    pub fn new(queue: Arc<JobQueue>, status: Arc<JobStatusStore>, barrier: Arc<JoinBarrier>) -> Self {
        Self { queue, status, barrier }
    }

    /// Build every component from one configuration.
    pub fn connect(config: QueueConfig) -> QueueResult<Self> {
        Ok(Self::new(
            Arc::new(JobQueue::new(config.clone())?),
            Arc::new(JobStatusStore::new(config.clone())?),
            Arc::new(JoinBarrier::new(config)?),
        ))
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn status(&self) -> &Arc<JobStatusStore> {
        &self.status
    }

    /// Record, open the barrier, then fan out.
    ///
    /// The barrier is open before any member can arrive at it.
    pub async fn submit(&self, plan: &PipelinePlan) -> QueueResult<SubmittedPipeline> {
        self.status.create_all(&plan.records()).await?;
        self.barrier
            .open(&plan.pipeline_id, plan.fan_out_count(), &plan.request)
            .await?;

        if let Err(e) = self.fan_out(plan).await {
            warn!(pipeline_id = %plan.pipeline_id, "Fan-out failed: {}", e);
            let detail = FailureDetail::new(FailureKind::Internal, format!("fan-out failed: {}", e));
            if let Err(mark_err) = self.status.mark_failed(&plan.pipeline_id, detail).await {
                warn!(pipeline_id = %plan.pipeline_id, "Could not record fan-out failure: {}", mark_err);
            }
            return Err(e);
        }

        info!(
            pipeline_id = %plan.pipeline_id,
            clip_jobs = plan.clips.len(),
            "Pipeline submitted"
        );

        Ok(SubmittedPipeline {
            job_id: plan.pipeline_id.clone(),
            audio_job_id: plan.audio.job_id.clone(),
            clip_job_ids: plan.clips.iter().map(|c| c.job_id.clone()).collect(),
        })
    }

    async fn fan_out(&self, plan: &PipelinePlan) -> QueueResult<()> {
        self.queue.enqueue(&QueueJob::AudioSynthesis(plan.audio.clone())).await?;
        for clip in &plan.clips {
            self.queue.enqueue(&QueueJob::ClipSynthesis(clip.clone())).await?;
        }
        Ok(())
    }

    /// Deliver a fan-out member's terminal result to the barrier, dispatching
    /// the finishing job when it is the last one.
    pub async fn report(&self, pipeline_id: &JobId, job_id: &JobId, result: &FanOutResult) -> QueueResult<BarrierArrival> {
        let arrival = self.barrier.arrive(pipeline_id, job_id, result).await?;

        if let BarrierArrival::Complete(job) = &arrival {
            match self.queue.enqueue(&QueueJob::Finishing(job.as_ref().clone())).await {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {
                    info!(pipeline_id = %pipeline_id, "Finishing job already enqueued");
                }
                Err(e) => return Err(e),
            }
            self.barrier.mark_dispatched(pipeline_id).await?;
        }

        Ok(arrival)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgen_models::JobStatus;

    fn request(lines: &[&str]) -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "subject": "Harbor",
            "language": "English",
            "vocal": "male",
            "tempo": "mid",
            "genres": ["indie"],
            "video_style": "film grain",
            "lyrics": "[Verse]\nBoats at dawn",
            "translated_lines": lines,
            "requester_id": "member-9"
        }))
        .unwrap()
    }

    #[test]
    fn test_one_clip_job_per_filtered_line() {
        let plan = PipelinePlan::build(request(&["[Intro]", "Boats at dawn!", "", "Nets, and gulls", "Boats at dawn!"])).unwrap();
        assert_eq!(plan.clips.len(), 3);
        assert_eq!(plan.fan_out_count(), 4);

        let ordinals: Vec<u32> = plan.clips.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(plan.clips[1].line, "Nets and gulls");
        assert_eq!(plan.clips[0].line, plan.clips[2].line);
    }

    #[test]
    fn test_records_cover_every_job() {
        let plan = PipelinePlan::build(request(&["one", "two"])).unwrap();
        let records = plan.records();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.status == JobStatus::Pending && r.pipeline_id == plan.pipeline_id));
        assert_eq!(records[0].id, plan.pipeline_id);
        assert_eq!(records[0].kind, JobKind::Finishing);
        assert_eq!(records[3].ordinal, Some(1));
    }

    #[test]
    fn test_invalid_request_builds_nothing() {
        let mut bad = request(&["[Chorus]", "!!!"]);
        bad.subject.clear();
        let err = PipelinePlan::build(bad).unwrap_err();
        assert!(err.fields.contains_key("subject"));
        assert!(err.fields.contains_key("translated_lines"));
    }
}
