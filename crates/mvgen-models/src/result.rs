//! Results produced by fan-out jobs and consumed by the finishing stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{FailureDetail, FailureKind};

/// Synthesized audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioResult {
    /// Remote audio URL
    pub url: String,
    /// Duration reported by the audio service (seconds)
    pub duration_secs: f64,
    /// Artwork generated alongside the track, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Pick the rendition to keep from a completed audio job.
///
/// Only the first two candidates are considered. The shorter one wins and
/// equal durations keep the first.
pub fn select_rendition(candidates: &[AudioResult]) -> Option<&AudioResult> {
    match candidates {
        [] => None,
        [only] => Some(only),
        [first, second, ..] => {
            if second.duration_secs < first.duration_secs {
                Some(second)
            } else {
                Some(first)
            }
        }
    }
}

/// Terminal outcome of the audio job as seen by the barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AudioOutcome {
    Ready { audio: AudioResult },
    Failed { failure: FailureDetail },
}

/// Terminal outcome of one clip job.
///
/// `Failed` is the failure sentinel: it travels to the barrier like a success
/// and is filtered out only by the finishing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClipResult {
    Ready { ordinal: u32, url: String },
    Failed { ordinal: u32, failure: FailureDetail },
}

impl ClipResult {
    pub fn ordinal(&self) -> u32 {
        match self {
            ClipResult::Ready { ordinal, .. } | ClipResult::Failed { ordinal, .. } => *ordinal,
        }
    }

    /// Remote URL of a successful clip.
    pub fn url(&self) -> Option<&str> {
        match self {
            ClipResult::Ready { url, .. } => Some(url),
            ClipResult::Failed { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ClipResult::Ready { .. })
    }
}

/// What a fan-out job leaves at the barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FanOutResult {
    Audio { outcome: AudioOutcome },
    Clip { result: ClipResult },
}

/// Aggregate input of the finishing job: audio first, clips in line order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JoinedResult {
    pub audio: AudioOutcome,
    pub clips: Vec<ClipResult>,
}

impl JoinedResult {
    /// Build from barrier arrivals in any order.
    pub fn from_arrivals(arrivals: impl IntoIterator<Item = FanOutResult>) -> Self {
        let mut audio = None;
        let mut clips = Vec::new();

        for arrival in arrivals {
            match arrival {
                FanOutResult::Audio { outcome } => audio = Some(outcome),
                FanOutResult::Clip { result } => clips.push(result),
            }
        }
        clips.sort_by_key(ClipResult::ordinal);

        let audio = audio.unwrap_or_else(|| AudioOutcome::Failed {
            failure: FailureDetail::new(
                FailureKind::AudioUnavailable,
                "audio result never reached the barrier",
            ),
        });

        Self { audio, clips }
    }

    /// The audio track, or the failure to report when there is none.
    pub fn require_audio(&self) -> Result<&AudioResult, FailureDetail> {
        match &self.audio {
            AudioOutcome::Ready { audio } => Ok(audio),
            AudioOutcome::Failed { failure } => Err(FailureDetail::new(
                FailureKind::AudioUnavailable,
                format!("audio synthesis failed ({})", failure),
            )),
        }
    }

    /// URLs of successful clips in line order, as a new sequence.
    pub fn usable_clip_urls(&self) -> Vec<String> {
        self.clips
            .iter()
            .filter_map(|clip| clip.url().map(str::to_string))
            .collect()
    }

    /// Number of failure sentinels.
    pub fn failed_clip_count(&self) -> usize {
        self.clips.iter().filter(|clip| !clip.is_ready()).count()
    }
}

/// Summary of a finished pipeline, enough to fetch the catalog entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinishedVideo {
    /// Catalog entity ID
    pub entity_id: String,
    /// Public URL of the video
    pub video_url: String,
    /// Public URL of the cover image
    pub cover_image_url: String,
    /// Final video duration (seconds)
    pub duration_secs: f64,
    /// Clips used in the assembly
    pub clip_count: usize,
    /// Clips discarded because their job failed
    pub discarded_clips: usize,
}

/// Result payload stored on a succeeded job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Audio(AudioResult),
    Clip(ClipResult),
    Finished(FinishedVideo),
}
