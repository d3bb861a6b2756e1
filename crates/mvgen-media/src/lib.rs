//! FFmpeg CLI wrapper and clip assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress parsing
//! - Media probing via ffprobe
//! - The forward/reverse clip assembly engine
//! - Audio muxing and cover frame extraction

pub mod assembly;
pub mod command;
pub mod cover;
pub mod error;
pub mod mux;
pub mod probe;
pub mod scratch;

pub use assembly::{
    plan_assembly, render_track, AssemblyPlan, Direction, Fade, RenderOptions, Segment, SlotPlan,
    DEFAULT_ATOMIC_UNIT_SECS, SLOT_FADE_SECS,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use cover::{extract_cover_frame, COVER_FRAME_SECS};
pub use error::{MediaError, MediaResult};
pub use mux::mux_audio;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use scratch::ScratchDir;
