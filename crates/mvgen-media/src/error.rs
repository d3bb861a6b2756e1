//! Media errors.

use std::path::PathBuf;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not installed")]
    FfmpegNotFound,

    #[error("ffprobe is not installed")]
    FfprobeNotFound,

    /// Non-zero exit; `stderr_tail` holds the last lines ffmpeg printed.
    #[error("{message}")]
    FfmpegFailed {
        message: String,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed on {path}: {stderr}")]
    FfprobeFailed { path: PathBuf, stderr: String },

    /// Every clip of the pipeline failed; there is nothing to tile.
    #[error("No usable clips to assemble")]
    NoUsableClips,

    #[error("Invalid assembly input: {0}")]
    InvalidInput(String),

    #[error("Unreadable media: {0}")]
    InvalidMedia(String),

    #[error("Missing media file {0}")]
    FileNotFound(PathBuf),

    #[error("ffmpeg killed after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Malformed ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, stderr_tail: Option<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
