//! Job messages carried on the queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mvgen_models::{GenerationRequest, JobId, JobKind, JoinedResult};

use crate::config::QueueName;

/// Generate the audio track for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSynthesisJob {
    pub job_id: JobId,
    pub pipeline_id: JobId,
    /// Lyrics sent as the audio prompt
    pub lyrics: String,
    /// Comma-joined style tags
    pub tags: String,
    /// Track title
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl AudioSynthesisJob {
    pub fn new(pipeline_id: JobId, request: &GenerationRequest) -> Self {
        Self {
            job_id: JobId::new(),
            pipeline_id,
            lyrics: request.lyrics.clone(),
            tags: request.audio_tags(),
            title: request.subject.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Generate the clip for one lyric line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSynthesisJob {
    pub job_id: JobId,
    pub pipeline_id: JobId,
    /// Position of the line in the filtered sequence
    pub ordinal: u32,
    /// The filtered lyric line
    pub line: String,
    /// Full prompt for the clip service
    pub prompt: String,
    /// Visual style
    pub style: String,
    pub created_at: DateTime<Utc>,
}

impl ClipSynthesisJob {
    pub fn new(pipeline_id: JobId, request: &GenerationRequest, ordinal: u32, line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            job_id: JobId::new(),
            pipeline_id,
            ordinal,
            prompt: request.clip_prompt(&line),
            line,
            style: request.video_style.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Assemble, upload and catalog the finished video.
///
/// The job id is the pipeline id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishingJob {
    pub job_id: JobId,
    pub request: GenerationRequest,
    /// Terminal results of every fan-out job
    pub joined: JoinedResult,
    pub created_at: DateTime<Utc>,
}

impl FinishingJob {
    pub fn new(pipeline_id: JobId, request: GenerationRequest, joined: JoinedResult) -> Self {
        Self {
            job_id: pipeline_id,
            request,
            joined,
            created_at: Utc::now(),
        }
    }
}

/// Any message on a pipeline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    AudioSynthesis(AudioSynthesisJob),
    ClipSynthesis(ClipSynthesisJob),
    Finishing(FinishingJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::AudioSynthesis(j) => &j.job_id,
            QueueJob::ClipSynthesis(j) => &j.job_id,
            QueueJob::Finishing(j) => &j.job_id,
        }
    }

    pub fn pipeline_id(&self) -> &JobId {
        match self {
            QueueJob::AudioSynthesis(j) => &j.pipeline_id,
            QueueJob::ClipSynthesis(j) => &j.pipeline_id,
            QueueJob::Finishing(j) => &j.job_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            QueueJob::AudioSynthesis(_) => JobKind::AudioSynthesis,
            QueueJob::ClipSynthesis(_) => JobKind::ClipSynthesis,
            QueueJob::Finishing(_) => JobKind::Finishing,
        }
    }

    pub fn queue(&self) -> QueueName {
        QueueName::for_kind(self.kind())
    }

    /// Key for deduplication. One finishing job per pipeline.
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::AudioSynthesis(j) => format!("audio:{}", j.job_id),
            QueueJob::ClipSynthesis(j) => format!("clip:{}", j.job_id),
            QueueJob::Finishing(j) => format!("finishing:{}", j.job_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgen_models::{AudioOutcome, AudioResult};

    fn request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "subject": "Lighthouse",
            "language": "English",
            "vocal": "female",
            "tempo": "slow",
            "genres": ["folk"],
            "instruments": ["guitar"],
            "video_style": "watercolor",
            "lyrics": "[Verse]\nA light on the rock",
            "translated_lines": ["A light on the rock"],
            "requester_id": "member-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_queue_job_tagging() {
        let job = QueueJob::ClipSynthesis(ClipSynthesisJob::new(JobId::new(), &request(), 0, "A light on the rock"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "clip_synthesis");
        assert_eq!(
            json["prompt"],
            "watercolor music video scene for the song \"Lighthouse\": A light on the rock"
        );
        assert_eq!(job.queue(), QueueName::Clip);
    }

    #[test]
    fn test_finishing_identity_is_pipeline() {
        let pipeline = JobId::new();
        let joined = JoinedResult {
            audio: AudioOutcome::Ready {
                audio: AudioResult {
                    url: "https://audio.example.com/a.mp3".to_string(),
                    duration_secs: 40.0,
                    image_url: None,
                },
            },
            clips: Vec::new(),
        };
        let job = QueueJob::Finishing(FinishingJob::new(pipeline.clone(), request(), joined));
        assert_eq!(job.job_id(), &pipeline);
        assert_eq!(job.pipeline_id(), &pipeline);
        assert_eq!(job.idempotency_key(), format!("finishing:{}", pipeline));
    }

    #[test]
    fn test_audio_job_from_request() {
        let job = AudioSynthesisJob::new(JobId::new(), &request());
        assert_eq!(job.tags, "folk,guitar,slow,female");
        assert_eq!(job.title, "Lighthouse");
    }
}
