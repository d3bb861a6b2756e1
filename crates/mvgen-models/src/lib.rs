//! Shared data models for the music video generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Generation requests and their validation
//! - Pipeline jobs and their status state machine
//! - Fan-out results and the joined input of the finishing stage
//! - Catalog metadata for finished videos
//! - Lyric line filtering

pub mod catalog;
pub mod error;
pub mod failure;
pub mod job;
pub mod lyrics;
pub mod request;
pub mod result;
pub mod status;

// Re-export common types
pub use catalog::MusicVideoMetadata;
pub use error::{describe_validation_errors, RequestValidationError};
pub use failure::{FailureDetail, FailureKind};
pub use job::{GenerationJob, JobId, JobKind, JobStatus};
pub use lyrics::{filter_lyric_lines, LyricLine};
pub use request::GenerationRequest;
pub use result::{
    select_rendition, AudioOutcome, AudioResult, ClipResult, FanOutResult,
    FinishedVideo, JobPayload, JoinedResult,
};
pub use status::StatusView;
