//! Audio/video muxing.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// AAC bitrate for the final track.
pub const AUDIO_BITRATE: &str = "192k";

/// Build the mux command: video stream copied, audio re-encoded to AAC.
pub fn mux_command(video: &Path, audio: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .add_input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .output_args(["-movflags", "+faststart"])
}

/// Combine an assembled video track with the audio track.
pub async fn mux_audio(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timeout_secs: u64,
) -> MediaResult<()> {
    let (video, audio) = (video.as_ref(), audio.as_ref());
    for input in [video, audio] {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    let cmd = mux_command(video, audio, output.as_ref());
    FfmpegRunner::new().with_timeout(timeout_secs).run(&cmd).await
}
