//! Deterministic object keys for finished artifacts.

use chrono::{DateTime, Utc};

const VIDEO_PREFIX: &str = "mv_videos";
const COVER_PREFIX: &str = "mv_covers";

/// Keys for the video and cover of one finished pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    pub video: String,
    pub cover: String,
}

impl ArtifactKeys {
    /// Keys derived from the requester and the finishing time.
    pub fn new(requester_id: &str, at: DateTime<Utc>) -> Self {
        let stem = format!("{}_{}", sanitize_requester(requester_id), at.format("%Y%m%d_%H%M%S"));
        Self {
            video: format!("{}/{}.mp4", VIDEO_PREFIX, stem),
            cover: format!("{}/{}.jpg", COVER_PREFIX, stem),
        }
    }
}

/// Keep `[A-Za-z0-9_-]`, replacing everything else with `_`.
pub fn sanitize_requester(requester_id: &str) -> String {
    let cleaned: String = requester_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}
