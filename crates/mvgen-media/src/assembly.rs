//! Clip assembly engine.
//!
//! Stretches a fixed set of short clips over an audio track of arbitrary length.
//! Each clip gets an equal slot. A slot is filled by playing the clip forward,
//! then backward, then forward again and so on, with the last segment truncated
//! so the slot ends exactly on time. The whole slot fades in and out once.
//!
//! Planning is pure and deterministic ([`plan_assembly`]); [`render_track`] turns
//! a plan into a video file with ffmpeg.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Native length of one generated clip (seconds).
pub const DEFAULT_ATOMIC_UNIT_SECS: f64 = 5.0;

/// Fade length at each end of a slot (seconds).
pub const SLOT_FADE_SECS: f64 = 1.0;

/// Segments shorter than one frame at 24 fps are dropped.
const MIN_SEGMENT_SECS: f64 = 1.0 / 24.0;

/// Playback direction of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

/// One playback of the source clip, possibly cut short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub direction: Direction,
    /// Played length (seconds)
    pub length_secs: f64,
    /// Whether playback stops before the end of the clip
    pub truncated: bool,
}

/// Fade placement within a slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fade {
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// Layout of one clip slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotPlan {
    /// Target slot length (seconds)
    pub duration_secs: f64,
    /// Whole atomic units that fit in the slot
    pub repeat_count: u32,
    /// Leftover after the whole units (seconds)
    pub remainder_secs: f64,
    pub segments: Vec<Segment>,
    pub fade_in: Fade,
    pub fade_out: Fade,
}

impl SlotPlan {
    /// Sum of segment lengths.
    pub fn total_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.length_secs).sum()
    }
}

/// Layout of the whole track: `clip_count` slots sharing one slot plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyPlan {
    pub audio_duration_secs: f64,
    pub atomic_unit_secs: f64,
    pub clip_count: usize,
    pub slot: SlotPlan,
}

impl AssemblyPlan {
    /// Expected track length.
    pub fn total_secs(&self) -> f64 {
        self.slot.total_secs() * self.clip_count as f64
    }
}

/// Plan the track for `clip_count` usable clips under an audio track.
pub fn plan_assembly(
    audio_duration_secs: f64,
    clip_count: usize,
    atomic_unit_secs: f64,
) -> MediaResult<AssemblyPlan> {
    if clip_count == 0 {
        return Err(MediaError::NoUsableClips);
    }
    if !audio_duration_secs.is_finite() || audio_duration_secs <= 0.0 {
        return Err(MediaError::invalid_input(format!(
            "audio duration must be positive, got {}",
            audio_duration_secs
        )));
    }
    if !atomic_unit_secs.is_finite() || atomic_unit_secs <= 0.0 {
        return Err(MediaError::invalid_input(format!(
            "atomic unit must be positive, got {}",
            atomic_unit_secs
        )));
    }

    let per_slot = audio_duration_secs / clip_count as f64;
    Ok(AssemblyPlan {
        audio_duration_secs,
        atomic_unit_secs,
        clip_count,
        slot: plan_slot(per_slot, atomic_unit_secs),
    })
}

/// Lay out one slot of `per_slot` seconds from forward/reverse plays of a clip.
pub fn plan_slot(per_slot: f64, unit: f64) -> SlotPlan {
    let repeat_count = (per_slot / unit).floor() as u32;
    let mut remainder = per_slot - f64::from(repeat_count) * unit;
    if remainder < MIN_SEGMENT_SECS {
        remainder = 0.0;
    }

    let full = |direction| Segment {
        direction,
        length_secs: unit,
        truncated: false,
    };
    let cut = |direction| Segment {
        direction,
        length_secs: remainder,
        truncated: true,
    };

    let mut segments = Vec::new();
    match repeat_count {
        1 => {
            segments.push(full(Direction::Forward));
            segments.push(cut(Direction::Reverse));
        }
        // Zero whole units falls through here as zero pairs plus a cut forward play.
        n => {
            for _ in 0..n / 2 {
                segments.push(full(Direction::Forward));
                segments.push(full(Direction::Reverse));
            }
            if n % 2 == 0 {
                segments.push(cut(Direction::Forward));
            } else {
                segments.push(full(Direction::Forward));
                segments.push(cut(Direction::Reverse));
            }
        }
    }
    segments.retain(|s| s.length_secs >= MIN_SEGMENT_SECS);

    let total: f64 = segments.iter().map(|s| s.length_secs).sum();
    let fade = SLOT_FADE_SECS.min(total / 2.0);

    SlotPlan {
        duration_secs: per_slot,
        repeat_count,
        remainder_secs: remainder,
        segments,
        fade_in: Fade {
            start_secs: 0.0,
            duration_secs: fade,
        },
        fade_out: Fade {
            start_secs: (total - fade).max(0.0),
            duration_secs: fade,
        },
    }
}

/// Output geometry and limits for rendering.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Per-ffmpeg-call timeout (seconds)
    pub step_timeout_secs: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            fps: 24,
            step_timeout_secs: 600,
        }
    }
}

impl RenderOptions {
    /// Fit, pad and retime a source so every clip shares one geometry.
    fn normalize_filter(&self, unit: f64) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},\
             tpad=stop_mode=clone:stop_duration={unit:.3}",
            w = self.width,
            h = self.height,
            fps = self.fps,
            unit = unit
        )
    }
}

/// Render the planned track from downloaded clips, in slot order.
///
/// Intermediate files are written to `work_dir`; the caller owns its cleanup.
pub async fn render_track(
    plan: &AssemblyPlan,
    sources: &[PathBuf],
    work_dir: &Path,
    output: &Path,
    options: &RenderOptions,
) -> MediaResult<()> {
    if sources.len() != plan.clip_count {
        return Err(MediaError::invalid_input(format!(
            "plan has {} slots but {} clips were supplied",
            plan.clip_count,
            sources.len()
        )));
    }

    let runner = FfmpegRunner::new().with_timeout(options.step_timeout_secs);
    let mut slot_files = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let slot_file = render_slot(
            &runner,
            index,
            source,
            &plan.slot,
            plan.atomic_unit_secs,
            work_dir,
            options,
        )
        .await?;
        slot_files.push(slot_file);
    }

    let list = work_dir.join("track.ffconcat");
    tokio::fs::write(&list, concat_list(slot_files.iter().map(|f| (f.as_path(), None)))).await?;

    let cmd = FfmpegCommand::new(&list, output)
        .concat_input()
        .video_codec("copy")
        .no_audio()
        .output_args(["-movflags", "+faststart"]);
    runner.run(&cmd).await?;

    info!(
        slots = plan.clip_count,
        expected_secs = plan.total_secs(),
        "Assembled video track"
    );
    Ok(())
}

async fn render_slot(
    runner: &FfmpegRunner,
    index: usize,
    source: &Path,
    slot: &SlotPlan,
    unit: f64,
    work_dir: &Path,
    options: &RenderOptions,
) -> MediaResult<PathBuf> {
    if !source.exists() {
        return Err(MediaError::FileNotFound(source.to_path_buf()));
    }

    let forward = work_dir.join(format!("slot_{:03}_f.mp4", index));
    let reverse = work_dir.join(format!("slot_{:03}_r.mp4", index));
    let sequence = work_dir.join(format!("slot_{:03}.ffconcat", index));
    let slot_file = work_dir.join(format!("slot_{:03}.mp4", index));

    let normalize = FfmpegCommand::new(source, &forward)
        .video_filter(options.normalize_filter(unit))
        .duration(unit)
        .no_audio()
        .video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .output_args(["-pix_fmt", "yuv420p"]);
    runner.run(&normalize).await?;

    if slot.segments.iter().any(|s| s.direction == Direction::Reverse) {
        let reversed = FfmpegCommand::new(&forward, &reverse)
            .video_filter("reverse")
            .no_audio()
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .output_args(["-pix_fmt", "yuv420p"]);
        runner.run(&reversed).await?;
    }

    let entries = slot.segments.iter().map(|segment| {
        let file = match segment.direction {
            Direction::Forward => forward.as_path(),
            Direction::Reverse => reverse.as_path(),
        };
        (file, segment.truncated.then_some(segment.length_secs))
    });
    tokio::fs::write(&sequence, concat_list(entries)).await?;

    let cmd = FfmpegCommand::new(&sequence, &slot_file)
        .concat_input()
        .video_filter(fade_filter(slot))
        .duration(slot.total_secs())
        .no_audio()
        .video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .output_args(["-pix_fmt", "yuv420p"]);
    runner.run(&cmd).await?;

    debug!(slot = index, segments = slot.segments.len(), "Rendered slot");
    Ok(slot_file)
}

/// `fade` filter for both ends of a slot.
pub fn fade_filter(slot: &SlotPlan) -> String {
    format!(
        "fade=t=in:st={:.3}:d={:.3},fade=t=out:st={:.3}:d={:.3}",
        slot.fade_in.start_secs,
        slot.fade_in.duration_secs,
        slot.fade_out.start_secs,
        slot.fade_out.duration_secs
    )
}

/// ffconcat script; `Some(outpoint)` cuts an entry short.
fn concat_list<'a>(entries: impl IntoIterator<Item = (&'a Path, Option<f64>)>) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for (path, outpoint) in entries {
        let name = path.to_string_lossy().replace('\'', "'\\''");
        let _ = writeln!(list, "file '{}'", name);
        if let Some(outpoint) = outpoint {
            let _ = writeln!(list, "outpoint {:.3}", outpoint);
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(slot: &SlotPlan) -> Vec<(Direction, f64)> {
        slot.segments.iter().map(|s| (s.direction, s.length_secs)).collect()
    }

    #[test]
    fn test_forty_seconds_four_clips() {
        let plan = plan_assembly(40.0, 4, 5.0).unwrap();
        assert_eq!(plan.slot.duration_secs, 10.0);
        assert_eq!(plan.slot.repeat_count, 2);
        assert_eq!(plan.slot.remainder_secs, 0.0);
        assert_eq!(
            shape(&plan.slot),
            vec![(Direction::Forward, 5.0), (Direction::Reverse, 5.0)]
        );
        assert!((plan.total_secs() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_forty_two_seconds_three_clips() {
        let plan = plan_assembly(42.0, 3, 5.0).unwrap();
        assert_eq!(plan.slot.duration_secs, 14.0);
        assert_eq!(plan.slot.repeat_count, 2);
        assert!((plan.slot.remainder_secs - 4.0).abs() < 1e-9);
        assert_eq!(
            shape(&plan.slot),
            vec![
                (Direction::Forward, 5.0),
                (Direction::Reverse, 5.0),
                (Direction::Forward, 4.0)
            ]
        );
        assert!(plan.slot.segments[2].truncated);
    }

    #[test]
    fn test_single_repeat() {
        let slot = plan_slot(7.5, 5.0);
        assert_eq!(slot.repeat_count, 1);
        assert_eq!(
            shape(&slot),
            vec![(Direction::Forward, 5.0), (Direction::Reverse, 2.5)]
        );
    }

    #[test]
    fn test_odd_repeat_ends_with_reverse_tail() {
        let slot = plan_slot(17.0, 5.0);
        assert_eq!(slot.repeat_count, 3);
        assert_eq!(
            shape(&slot),
            vec![
                (Direction::Forward, 5.0),
                (Direction::Reverse, 5.0),
                (Direction::Forward, 5.0),
                (Direction::Reverse, 2.0)
            ]
        );
    }

    #[test]
    fn test_slot_shorter_than_unit() {
        let slot = plan_slot(3.0, 5.0);
        assert_eq!(slot.repeat_count, 0);
        assert_eq!(shape(&slot), vec![(Direction::Forward, 3.0)]);
    }

    #[test]
    fn test_slot_duration_matches_target() {
        for per_slot in [2.0, 5.0, 9.99, 10.0, 14.0, 23.7, 31.25, 60.0] {
            let slot = plan_slot(per_slot, 5.0);
            assert!(
                (slot.total_secs() - per_slot).abs() < MIN_SEGMENT_SECS,
                "per_slot {} produced {}",
                per_slot,
                slot.total_secs()
            );
        }
    }

    #[test]
    fn test_fades_cover_whole_slot_once() {
        let slot = plan_slot(14.0, 5.0);
        assert_eq!(slot.fade_in.start_secs, 0.0);
        assert_eq!(slot.fade_in.duration_secs, 1.0);
        assert!((slot.fade_out.start_secs - 13.0).abs() < 1e-9);
        assert_eq!(
            fade_filter(&slot),
            "fade=t=in:st=0.000:d=1.000,fade=t=out:st=13.000:d=1.000"
        );
    }

    #[test]
    fn test_short_slot_clamps_fades() {
        let slot = plan_slot(1.5, 5.0);
        assert!((slot.fade_in.duration_secs - 0.75).abs() < 1e-9);
        assert!((slot.fade_out.start_secs - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan_assembly(187.3, 7, 5.0).unwrap(), plan_assembly(187.3, 7, 5.0).unwrap());
    }

    #[test]
    fn test_zero_clips_is_explicit_failure() {
        assert!(matches!(plan_assembly(40.0, 0, 5.0), Err(MediaError::NoUsableClips)));
    }

    #[test]
    fn test_invalid_durations() {
        assert!(matches!(plan_assembly(0.0, 2, 5.0), Err(MediaError::InvalidInput(_))));
        assert!(matches!(plan_assembly(f64::NAN, 2, 5.0), Err(MediaError::InvalidInput(_))));
        assert!(matches!(plan_assembly(40.0, 2, 0.0), Err(MediaError::InvalidInput(_))));
    }

    #[test]
    fn test_track_within_one_unit_of_audio() {
        for (audio, clips) in [(40.0, 4), (42.0, 3), (183.4, 16), (61.0, 1), (9.0, 5)] {
            let plan = plan_assembly(audio, clips, 5.0).unwrap();
            assert!((plan.total_secs() - audio).abs() < plan.atomic_unit_secs);
        }
    }

    #[test]
    fn test_concat_list_format() {
        let f = PathBuf::from("/tmp/w/slot_000_f.mp4");
        let r = PathBuf::from("/tmp/w/slot_000_r.mp4");
        let list = concat_list(vec![(f.as_path(), None), (r.as_path(), Some(4.0))]);
        assert_eq!(
            list,
            "ffconcat version 1.0\n\
             file '/tmp/w/slot_000_f.mp4'\n\
             file '/tmp/w/slot_000_r.mp4'\n\
             outpoint 4.000\n"
        );
    }

    #[test]
    fn test_normalize_filter_pads_to_unit() {
        let filter = RenderOptions::default().normalize_filter(5.0);
        assert!(filter.starts_with("scale=720:1280"));
        assert!(filter.contains("fps=24"));
        assert!(filter.ends_with("stop_duration=5.000"));
    }
}
