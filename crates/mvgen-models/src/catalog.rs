//! Catalog metadata for a finished music video.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{describe_validation_errors, RequestValidationError};
use crate::GenerationRequest;

/// Metadata written to the catalog once per pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MusicVideoMetadata {
    #[validate(length(min = 1))]
    pub requester_id: String,

    #[validate(length(min = 1, max = 200))]
    pub subject: String,

    #[validate(length(min = 1, max = 100))]
    pub language: String,

    #[validate(length(min = 1, max = 100))]
    pub vocal: String,

    #[validate(length(min = 1, max = 10))]
    pub tempo: String,

    #[validate(length(min = 1))]
    pub genres: Vec<String>,

    pub instruments: Vec<String>,

    #[validate(length(min = 1, max = 200))]
    pub video_style: String,

    #[validate(length(min = 1, max = 2000))]
    pub lyrics: String,

    /// Final video duration (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub duration_secs: f64,

    #[validate(url, length(max = 1000))]
    pub video_url: String,

    #[validate(url, length(max = 1000))]
    pub cover_image_url: String,

    pub created_at: DateTime<Utc>,
}

impl MusicVideoMetadata {
    /// Combine the request with the finished artifacts.
    pub fn from_request(
        request: &GenerationRequest,
        duration_secs: f64,
        video_url: impl Into<String>,
        cover_image_url: impl Into<String>,
    ) -> Self {
        Self {
            requester_id: request.requester_id.clone(),
            subject: request.subject.clone(),
            language: request.language.clone(),
            vocal: request.vocal.clone(),
            tempo: request.tempo.clone(),
            genres: request.genres.clone(),
            instruments: request.instruments.clone(),
            video_style: request.video_style.clone(),
            lyrics: request.lyrics.clone(),
            duration_secs,
            video_url: video_url.into(),
            cover_image_url: cover_image_url.into(),
            created_at: Utc::now(),
        }
    }

    /// Check the catalog's field constraints.
    pub fn check(&self) -> Result<(), RequestValidationError> {
        self.validate().map_err(|errors| RequestValidationError {
            fields: describe_validation_errors(&errors),
        })
    }
}
