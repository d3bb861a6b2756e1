//! Cover image extraction.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Frame position used for the cover (seconds).
pub const COVER_FRAME_SECS: f64 = 1.0;

pub fn cover_command(video: &Path, output: &Path, at_secs: f64) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .seek(at_secs)
        .single_frame()
        .output_args(["-q:v", "2"])
}

/// Write a single JPEG frame of `video` taken at `at_secs`.
pub async fn extract_cover_frame(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    at_secs: f64,
) -> MediaResult<()> {
    let video = video.as_ref();
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    let cmd = cover_command(video, output.as_ref(), at_secs);
    FfmpegRunner::new().with_timeout(60).run(&cmd).await?;

    if !output.as_ref().exists() {
        return Err(MediaError::InvalidMedia(format!(
            "no frame at {:.1}s in {}",
            at_secs,
            video.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_seeks_before_input() {
        let args = cover_command(Path::new("final.mp4"), Path::new("cover.jpg"), COVER_FRAME_SECS).build_args();
        let seek = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(seek < input);
        assert_eq!(args[seek + 1], "1.000");
        assert!(args.join(" ").contains("-frames:v 1"));
    }
}
