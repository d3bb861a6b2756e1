//! Finishing stage: assemble, mux, cover, upload, catalog.
//!
//! Failed clips are filtered into a new sequence before any arithmetic
//! depends on the clip count. Scratch files live in one directory per job,
//! removed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use mvgen_catalog::CatalogStore;
use mvgen_media::{
    extract_cover_frame, get_duration, mux_audio, plan_assembly, render_track, AssemblyPlan, MediaError,
    RenderOptions, ScratchDir, COVER_FRAME_SECS,
};
use mvgen_models::{
    AudioResult, FailureDetail, FailureKind, FinishedVideo, GenerationRequest, MusicVideoMetadata,
};
use mvgen_queue::FinishingJob;
use mvgen_storage::{ArtifactKeys, ObjectStore};

use crate::error::{WorkerError, WorkerResult};
use crate::fetch::{download_all, download_to};
use crate::logging::JobLogger;
use crate::metrics;
use crate::tasks::{PipelineTask, TaskOutcome};

/// Settings of the finishing stage.
#[derive(Debug, Clone)]
pub struct FinishingOptions {
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Native length of one clip (seconds)
    pub atomic_unit_secs: f64,
    pub render: RenderOptions,
    pub download_concurrency: usize,
}

pub struct FinishingTask {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    http: Client,
    options: FinishingOptions,
}

/// Inputs that passed the preconditions.
struct Prepared {
    audio: AudioResult,
    clip_urls: Vec<String>,
    plan: AssemblyPlan,
}

impl FinishingTask {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: Arc<dyn CatalogStore>, http: Client, options: FinishingOptions) -> Self {
        Self {
            store,
            catalog,
            http,
            options,
        }
    }

    /// Produce the finished video, or the domain failure that prevents it.
    pub async fn finish(
        &self,
        job: &FinishingJob,
        logger: &JobLogger,
    ) -> WorkerResult<Result<FinishedVideo, FailureDetail>> {
        let prepared = match self.prepare(job) {
            Ok(prepared) => prepared,
            Err(failure) => return Ok(Err(failure)),
        };

        let discarded = job.joined.failed_clip_count();
        if discarded > 0 {
            metrics::record_clips_discarded(discarded);
            logger.log_warning(&format!(
                "{} of {} clips failed and were discarded",
                discarded,
                job.joined.clips.len()
            ));
        }
        logger.log_progress(&format!(
            "assembling {} clips over {:.1}s of audio ({:.2}s per slot, {} units, remainder {:.2}s)",
            prepared.plan.clip_count,
            prepared.audio.duration_secs,
            prepared.plan.slot.duration_secs,
            prepared.plan.slot.repeat_count,
            prepared.plan.slot.remainder_secs
        ));

        let scratch = ScratchDir::new_in(&self.options.work_dir, &format!("finish-{}-", job.job_id))?;
        let result = self.produce(job, &prepared, &scratch, logger).await;
        scratch.close();
        result
    }

    /// Check the preconditions and plan the assembly, before any download.
    fn prepare(&self, job: &FinishingJob) -> Result<Prepared, FailureDetail> {
        let audio = job.joined.require_audio()?.clone();
        let clip_urls = job.joined.usable_clip_urls();

        let plan = plan_assembly(audio.duration_secs, clip_urls.len(), self.options.atomic_unit_secs).map_err(
            |e| match e {
                MediaError::NoUsableClips => FailureDetail::new(
                    FailureKind::NoUsableClips,
                    format!("all {} clip jobs failed", job.joined.clips.len()),
                ),
                other => FailureDetail::new(
                    FailureKind::AudioUnavailable,
                    format!("audio track cannot be assembled: {}", other),
                ),
            },
        )?;

        Ok(Prepared { audio, clip_urls, plan })
    }

    /// Everything that touches the scratch directory.
    async fn produce(
        &self,
        job: &FinishingJob,
        prepared: &Prepared,
        scratch: &ScratchDir,
        logger: &JobLogger,
    ) -> WorkerResult<Result<FinishedVideo, FailureDetail>> {
        match self.render_and_publish(job, prepared, scratch, logger).await {
            Ok(video) => Ok(Ok(video)),
            Err(WorkerError::Catalog(e)) if e.is_validation() => Ok(Err(FailureDetail::new(
                FailureKind::PersistenceValidation,
                e.to_string(),
            ))),
            Err(WorkerError::Media(MediaError::NoUsableClips)) => Ok(Err(FailureDetail::new(
                FailureKind::NoUsableClips,
                "no clip could be assembled",
            ))),
            Err(e) => Err(e),
        }
    }

    async fn render_and_publish(
        &self,
        job: &FinishingJob,
        prepared: &Prepared,
        scratch: &ScratchDir,
        logger: &JobLogger,
    ) -> WorkerResult<FinishedVideo> {
        let request: &GenerationRequest = &job.request;

        let step = Instant::now();
        let audio_path = scratch.file("audio.src");
        download_to(&self.http, &prepared.audio.url, &audio_path).await?;
        let clip_paths = download_all(
            &self.http,
            &prepared.clip_urls,
            scratch.path(),
            self.options.download_concurrency,
        )
        .await?;
        logger.log_timing("download", step.elapsed());

        let step = Instant::now();
        let track = scratch.file("track.mp4");
        render_track(&prepared.plan, &clip_paths, scratch.path(), &track, &self.options.render).await?;
        let final_video = scratch.file("final.mp4");
        mux_audio(&track, &audio_path, &final_video, self.options.render.step_timeout_secs).await?;
        let cover = scratch.file("cover.jpg");
        extract_cover_frame(&final_video, &cover, COVER_FRAME_SECS).await?;
        metrics::record_render(step.elapsed().as_secs_f64());
        logger.log_timing("render", step.elapsed());

        let duration_secs = match get_duration(&final_video).await {
            Ok(duration) => duration,
            Err(e) => {
                logger.log_warning(&format!("probe failed, using audio duration: {}", e));
                prepared.audio.duration_secs
            }
        };

        let step = Instant::now();
        let keys = ArtifactKeys::new(&request.requester_id, Utc::now());
        let video_url = self.store.put_file(&final_video, &keys.video, "video/mp4").await?;
        let cover_image_url = self.store.put_file(&cover, &keys.cover, "image/jpeg").await?;
        metrics::record_upload(step.elapsed().as_secs_f64());
        logger.log_timing("upload", step.elapsed());

        let metadata = MusicVideoMetadata::from_request(request, duration_secs, &video_url, &cover_image_url);
        let entity_id = self.catalog.create(&metadata).await?;

        Ok(FinishedVideo {
            entity_id,
            video_url,
            cover_image_url,
            duration_secs,
            clip_count: prepared.clip_urls.len(),
            discarded_clips: job.joined.failed_clip_count(),
        })
    }
}

#[async_trait]
impl PipelineTask for FinishingTask {
    type Job = FinishingJob;

    fn operation(&self) -> &'static str {
        "finishing"
    }

    async fn run(&self, job: &FinishingJob, logger: &JobLogger) -> WorkerResult<TaskOutcome> {
        let result = self.finish(job, logger).await?;
        match &result {
            Ok(video) => logger.log_completion(&format!(
                "catalog entry {} ({:.1}s, {} clips)",
                video.entity_id, video.duration_secs, video.clip_count
            )),
            Err(failure) => logger.log_failure(&failure.to_string()),
        }
        Ok(TaskOutcome::Finished(result))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mvgen_catalog::CatalogResult;
    use mvgen_models::{AudioOutcome, ClipResult, FanOutResult, JobId, JoinedResult};
    use mvgen_storage::StorageResult;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Store that counts calls; finishing must not reach it in these tests.
    #[derive(Default)]
    struct CountingStore {
        puts: AtomicU32,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn put_file(&self, _path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.example.com/{}", key))
        }
    }

    #[derive(Default)]
    struct CountingCatalog {
        creates: AtomicU32,
    }

    #[async_trait]
    impl CatalogStore for CountingCatalog {
        async fn create(&self, _metadata: &MusicVideoMetadata) -> CatalogResult<String> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok("entity-1".to_string())
        }
    }

    pub(crate) fn request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "subject": "Summer rain",
            "language": "English",
            "vocal": "female",
            "tempo": "fast",
            "genres": ["pop"],
            "video_style": "anime",
            "lyrics": "[Verse]\nRain on the window\nDancing alone",
            "requester_id": "member-42"
        }))
        .unwrap()
    }

    fn audio_ready(duration_secs: f64) -> FanOutResult {
        FanOutResult::Audio {
            outcome: AudioOutcome::Ready {
                audio: AudioResult {
                    url: "http://127.0.0.1:9/audio.mp3".to_string(),
                    duration_secs,
                    image_url: None,
                },
            },
        }
    }

    fn clip_failed(ordinal: u32) -> FanOutResult {
        FanOutResult::Clip {
            result: ClipResult::Failed {
                ordinal,
                failure: FailureDetail::new(FailureKind::PollingTimeout, "no result after 1800s"),
            },
        }
    }

    fn clip_ready(ordinal: u32) -> FanOutResult {
        FanOutResult::Clip {
            result: ClipResult::Ready {
                ordinal,
                url: format!("http://127.0.0.1:9/clip{}.mp4", ordinal),
            },
        }
    }

    fn finishing_job(arrivals: Vec<FanOutResult>) -> FinishingJob {
        FinishingJob::new(JobId::new(), request(), JoinedResult::from_arrivals(arrivals))
    }

    struct Harness {
        task: FinishingTask,
        store: Arc<CountingStore>,
        catalog: Arc<CountingCatalog>,
        _work_dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let work_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CountingStore::default());
        let catalog = Arc::new(CountingCatalog::default());
        let options = FinishingOptions {
            work_dir: work_dir.path().to_path_buf(),
            atomic_unit_secs: 5.0,
            render: RenderOptions::default(),
            download_concurrency: 2,
        };
        let http = Client::builder().timeout(Duration::from_secs(2)).build().unwrap();
        Harness {
            task: FinishingTask::new(store.clone(), catalog.clone(), http, options),
            store,
            catalog,
            _work_dir: work_dir,
        }
    }

    fn logger(job: &FinishingJob) -> JobLogger {
        JobLogger::new(&job.job_id, &job.job_id, "finishing")
    }

    #[tokio::test]
    async fn test_all_clips_failed_is_no_usable_clips() {
        let h = harness();
        let job = finishing_job(vec![clip_failed(1), audio_ready(42.0), clip_failed(0)]);

        let result = h.task.finish(&job, &logger(&job)).await.unwrap();

        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoUsableClips);
        assert_eq!(h.store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(h.catalog.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_audio_is_audio_unavailable() {
        let h = harness();
        let failed_audio = FanOutResult::Audio {
            outcome: AudioOutcome::Failed {
                failure: FailureDetail::new(FailureKind::RemoteFailed, "quota"),
            },
        };
        let job = finishing_job(vec![clip_ready(0), failed_audio]);

        let outcome = h.task.run(&job, &logger(&job)).await.unwrap();

        match outcome {
            TaskOutcome::Finished(Err(failure)) => {
                assert_eq!(failure.kind, FailureKind::AudioUnavailable);
                assert!(failure.reason.contains("quota"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prepare_plans_only_usable_clips() {
        let h = harness();
        let job = finishing_job(vec![clip_ready(0), clip_failed(1), clip_ready(2), audio_ready(42.0)]);

        let prepared = h.task.prepare(&job).unwrap();

        assert_eq!(prepared.clip_urls.len(), 2);
        assert!(prepared.clip_urls[1].ends_with("clip2.mp4"));
        assert_eq!(prepared.plan.clip_count, 2);
        assert!((prepared.plan.slot.duration_secs - 21.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_download_failure_is_retryable_attempt_error() {
        let h = harness();
        let job = finishing_job(vec![clip_ready(0), audio_ready(10.0)]);

        let err = h.task.finish(&job, &logger(&job)).await.unwrap_err();

        assert!(matches!(err, WorkerError::DownloadFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(h.catalog.creates.load(Ordering::SeqCst), 0);
        // Scratch space is gone even though the attempt failed.
        assert_eq!(std::fs::read_dir(h.task.options.work_dir.as_path()).unwrap().count(), 0);
    }
}
