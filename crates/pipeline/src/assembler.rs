//! Assembly of annotated anomaly frames into a video
//!
//! Frames are read back from the request directory, ordered numerically by
//! the index in their file name, validated for identical dimensions and piped
//! as raw RGB24 into the `ffmpeg` CLI.

use crate::annotator::parse_frame_index;
use deepfake_common::{ProcessingError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Video encoding settings
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Output frame rate
    pub fps: u32,
    /// File name of the assembled video inside the request directory
    pub output_filename: String,
    /// Encoder passed to `-c:v`
    pub video_codec: String,
    /// Path or name of the ffmpeg executable
    pub ffmpeg_binary: PathBuf,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            output_filename: "output_video.mp4".to_string(),
            video_codec: "libx264".to_string(),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

/// List `frame_{n}.jpg` files in `dir`, sorted by `n`
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn collect_annotated_frames(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(parse_frame_index) {
            frames.push((index, entry.path()));
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    Ok(frames)
}

/// Check that every frame has the dimensions of the first one
///
/// Returns the shared `(width, height)`.
fn validate_dimensions(frames: &[(u64, PathBuf)]) -> Result<(u32, u32)> {
    let Some((_, first)) = frames.first() else {
        return Err(ProcessingError::InvalidInput(
            "no frames to validate".to_string(),
        ));
    };
    let (expected_width, expected_height) = image::image_dimensions(first)?;

    for (_, path) in &frames[1..] {
        let (width, height) = image::image_dimensions(path)?;
        if (width, height) != (expected_width, expected_height) {
            return Err(ProcessingError::DimensionMismatch {
                frame: path.display().to_string(),
                expected_width,
                expected_height,
                width,
                height,
            });
        }
    }
    Ok((expected_width, expected_height))
}

/// Encode the annotated frames in `dir` into a single video
///
/// Returns `Ok(None)` when the directory holds no annotated frames.
///
/// # Errors
///
/// Returns [`ProcessingError::DimensionMismatch`] before any encoding starts if
/// frame sizes differ, or [`ProcessingError::EncodeFailed`] if ffmpeg cannot
/// be run or exits unsuccessfully.
pub fn assemble_video(dir: &Path, config: &AssemblerConfig) -> Result<Option<PathBuf>> {
    let frames = collect_annotated_frames(dir)?;
    if frames.is_empty() {
        info!("No anomaly frames in {}, skipping video assembly", dir.display());
        return Ok(None);
    }

    let (width, height) = validate_dimensions(&frames)?;
    let output_path = dir.join(&config.output_filename);

    let mut cmd = Command::new(&config.ffmpeg_binary);
    cmd.args(["-y", "-loglevel", "error"])
        .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
        .args(["-s", &format!("{width}x{height}")])
        .args(["-r", &config.fps.to_string()])
        .args(["-i", "-"])
        // yuv420p needs even dimensions
        .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
        .args(["-c:v", &config.video_codec, "-pix_fmt", "yuv420p"])
        .arg(&output_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!("FFmpeg command: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| ProcessingError::EncodeFailed(format!("Failed to execute ffmpeg: {e}")))?;

    let write_result = match child.stdin.take() {
        Some(mut stdin) => write_frames(&mut stdin, &frames),
        None => Err(ProcessingError::EncodeFailed(
            "ffmpeg stdin unavailable".to_string(),
        )),
    };

    let output = child
        .wait_with_output()
        .map_err(|e| ProcessingError::EncodeFailed(format!("Failed to wait for ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessingError::EncodeFailed(format!(
            "ffmpeg failed: {}",
            stderr.trim()
        )));
    }
    write_result?;

    info!(
        "Assembled {} anomaly frames into {}",
        frames.len(),
        output_path.display()
    );
    Ok(Some(output_path))
}

fn write_frames(stdin: &mut impl Write, frames: &[(u64, PathBuf)]) -> Result<()> {
    for (index, path) in frames {
        let image = image::open(path)?.to_rgb8();
        stdin.write_all(image.as_raw()).map_err(|e| {
            warn!("ffmpeg stopped accepting frames at frame {}: {}", index, e);
            ProcessingError::EncodeFailed(format!("Failed to write frame {index}: {e}"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32) {
        RgbImage::new(width, height).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_collect_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_10.jpg", "frame_2.jpg", "frame_100.jpg", "frame_1.jpg"] {
            write_frame(dir.path(), name, 8, 8);
        }
        std::fs::write(dir.path().join("output_video.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let indices: Vec<u64> = collect_annotated_frames(dir.path())
            .unwrap()
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        assert_eq!(indices, vec![1, 2, 10, 100]);
    }

    #[test]
    fn test_no_frames_produces_no_video() {
        let dir = tempfile::tempdir().unwrap();
        let result = assemble_video(dir.path(), &AssemblerConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dimension_mismatch_fails_before_encoding() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "frame_2.jpg", 16, 16);
        write_frame(dir.path(), "frame_10.jpg", 32, 16);

        let config = AssemblerConfig {
            ffmpeg_binary: PathBuf::from("/nonexistent/ffmpeg"),
            ..AssemblerConfig::default()
        };
        match assemble_video(dir.path(), &config) {
            Err(ProcessingError::DimensionMismatch {
                frame,
                expected_width,
                width,
                ..
            }) => {
                assert!(frame.ends_with("frame_10.jpg"));
                assert_eq!(expected_width, 16);
                assert_eq!(width, 32);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_ffmpeg_is_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "frame_0.jpg", 16, 16);

        let config = AssemblerConfig {
            ffmpeg_binary: PathBuf::from("/nonexistent/ffmpeg"),
            ..AssemblerConfig::default()
        };
        assert!(matches!(
            assemble_video(dir.path(), &config),
            Err(ProcessingError::EncodeFailed(_))
        ));
    }
}
