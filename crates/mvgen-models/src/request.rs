//! Generation request submitted by a client.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{describe_validation_errors, RequestValidationError};
use crate::lyrics::{filter_lyric_lines, split_lines, LyricLine};

/// Everything needed to generate one music video.
///
/// Immutable once submitted; jobs carry clones of it. Absent fields decode
/// as empty so that validation reports every missing field at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct GenerationRequest {
    /// Song title / topic
    #[validate(
        length(min = 1, max = 200, message = "subject is required (at most 200 characters)"),
        custom(function = "not_blank")
    )]
    pub subject: String,

    /// Lyrics language
    #[validate(
        length(min = 1, max = 100, message = "language is required (at most 100 characters)"),
        custom(function = "not_blank")
    )]
    pub language: String,

    /// Vocal style, e.g. "female"
    #[validate(
        length(min = 1, max = 100, message = "vocal is required (at most 100 characters)"),
        custom(function = "not_blank")
    )]
    pub vocal: String,

    /// Tempo label, e.g. "fast"
    #[validate(
        length(min = 1, max = 10, message = "tempo is required (at most 10 characters)"),
        custom(function = "not_blank")
    )]
    pub tempo: String,

    /// Genre tags
    #[validate(length(min = 1, message = "at least one genre is required"))]
    pub genres: Vec<String>,

    /// Instrument tags
    pub instruments: Vec<String>,

    /// Visual style for the clips
    #[validate(
        length(min = 1, max = 200, message = "video_style is required (at most 200 characters)"),
        custom(function = "not_blank")
    )]
    pub video_style: String,

    /// Original lyrics, used as the audio prompt
    #[validate(
        length(min = 1, max = 2000, message = "lyrics are required (at most 2000 characters)"),
        custom(function = "not_blank")
    )]
    pub lyrics: String,

    /// Line-split translated lyrics; one clip per surviving line.
    /// Falls back to the lines of `lyrics` when empty.
    pub translated_lines: Vec<String>,

    /// Requester identity
    #[validate(length(min = 1, message = "requester_id is required"))]
    pub requester_id: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

impl GenerationRequest {
    /// Validate the request and compute its clip lines.
    ///
    /// Runs before anything is submitted, so an invalid request never fans out.
    pub fn validated_lines(&self) -> Result<Vec<LyricLine>, RequestValidationError> {
        let mut fields = match self.validate() {
            Ok(()) => Default::default(),
            Err(errors) => describe_validation_errors(&errors),
        };

        let lines = self.clip_lines();
        if lines.is_empty() {
            fields
                .entry("translated_lines".to_string())
                .or_default()
                .push("no usable lyric line after removing tags and punctuation".to_string());
        }

        if fields.is_empty() {
            Ok(lines)
        } else {
            Err(RequestValidationError { fields })
        }
    }

    /// Filtered lyric lines that drive clip generation.
    pub fn clip_lines(&self) -> Vec<LyricLine> {
        if self.translated_lines.is_empty() {
            filter_lyric_lines(&split_lines(&self.lyrics))
        } else {
            filter_lyric_lines(&self.translated_lines)
        }
    }

    /// Style tags sent to the audio service: genres, instruments, tempo, vocal.
    pub fn audio_tags(&self) -> String {
        self.genres
            .iter()
            .chain(self.instruments.iter())
            .map(String::as_str)
            .chain([self.tempo.as_str(), self.vocal.as_str()])
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Prompt for the clip of one lyric line.
    pub fn clip_prompt(&self, line: &str) -> String {
        format!(
            "{} music video scene for the song \"{}\": {}",
            self.video_style.trim(),
            self.subject.trim(),
            line
        )
    }
}
