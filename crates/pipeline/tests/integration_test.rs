/// End-to-end pipeline tests on videos synthesized with the `ffmpeg` CLI
///
/// A stub classifier marks frames as fake by brightness so results are
/// deterministic without a model file.
use deepfake_common::{LabelScore, ProcessingError};
use deepfake_frame_classifier::{ClassifierError, FrameClassifierAdapter, ImageClassifier};
use deepfake_pipeline::{DeepfakePipeline, PipelineConfig};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Video whose first half is black and second half white
fn synthesize_black_then_white(dir: &Path, frames_per_half: u32) -> PathBuf {
    let path = dir.join("input.mp4");
    let count = frames_per_half.to_string();
    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error"])
        .args(["-f", "lavfi", "-i", "color=c=black:size=64x48:rate=25"])
        .args(["-f", "lavfi", "-i", "color=c=white:size=64x48:rate=25"])
        .args([
            "-filter_complex",
            &format!("[0:v]trim=end_frame={count}[a];[1:v]trim=end_frame={count}[b];[a][b]concat=n=2:v=1[out]"),
        ])
        .args(["-map", "[out]", "-c:v", "mpeg4", "-q:v", "2"])
        .arg(&path)
        .status()
        .expect("Failed to run ffmpeg");
    assert!(status.success(), "ffmpeg failed to synthesize test video");
    path
}

/// Bright frames are "fake"
struct BrightnessClassifier;

impl ImageClassifier for BrightnessClassifier {
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, ClassifierError> {
        let mean = image.pixels().map(|p| f32::from(p[0])).sum::<f32>()
            / (image.width() * image.height()) as f32;
        let fake = mean / 255.0;
        Ok(vec![
            LabelScore::new("Real", 1.0 - fake),
            LabelScore::new("Fake", fake),
        ])
    }
}

fn pipeline() -> DeepfakePipeline {
    DeepfakePipeline::new(
        FrameClassifierAdapter::new(Arc::new(BrightnessClassifier)),
        PipelineConfig {
            workers: 2,
            ..PipelineConfig::default()
        },
    )
}

#[test]
fn test_pipeline_flags_bright_half() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping test_pipeline_flags_bright_half");
        return;
    }
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let video = synthesize_black_then_white(input_dir.path(), 10);

    let report = pipeline().run(&video, output_dir.path()).unwrap();

    assert_eq!(report.frame_skip, 1);
    assert_eq!(report.scores.len(), 20);
    assert_eq!(report.scores.frame_indices(), (0..20).collect::<Vec<u64>>());

    let anomalies: Vec<u64> = report
        .frames_with_anomalies
        .iter()
        .map(|a| a.frame_index)
        .collect();
    assert_eq!(anomalies, (10..20).collect::<Vec<u64>>());
    for anomaly in &report.frames_with_anomalies {
        assert!(anomaly.frame_artifact.exists());
        assert!(anomaly.fake_score > anomaly.real_score);
    }

    let video_out = report.output_video.clone().expect("anomaly video expected");
    assert!(video_out.exists());
    assert_eq!(deepfake_video_decoder::probe_frame_count(&video_out).unwrap(), 10);

    let stats = report.final_scores.summary().unwrap();
    assert_eq!(stats.total_frames, 20);
    assert_eq!(stats.real_count, 10);
    assert_eq!(stats.fake_count, 10);
    assert_eq!(stats.real_percentage, 50.0);
    assert_eq!(stats.fake_percentage, 50.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["real_scores"].as_array().unwrap().len(), 20);
    assert_eq!(json["final_scores"]["fake_count"], 10);
}

#[test]
fn test_pipeline_without_anomalies_produces_no_video() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping test_pipeline_without_anomalies_produces_no_video");
        return;
    }
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let video = synthesize_black_then_white(input_dir.path(), 5);

    struct AlwaysReal;
    impl ImageClassifier for AlwaysReal {
        fn classify(&self, _image: &RgbImage) -> Result<Vec<LabelScore>, ClassifierError> {
            Ok(vec![LabelScore::new("Real", 0.99), LabelScore::new("Fake", 0.01)])
        }
    }

    let pipeline = DeepfakePipeline::new(
        FrameClassifierAdapter::new(Arc::new(AlwaysReal)),
        PipelineConfig::default(),
    );
    let report = pipeline.run(&video, output_dir.path()).unwrap();

    assert!(report.frames_with_anomalies.is_empty());
    assert!(report.output_video.is_none());
    assert!(!output_dir.path().join("output_video.mp4").exists());
}

#[test]
fn test_pipeline_rejects_non_video() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.mp4");
    std::fs::write(&path, b"plain text, not a video").unwrap();

    let result = pipeline().run(&path, &dir.path().join("out"));
    assert!(matches!(
        result,
        Err(ProcessingError::OpenFailed(_) | ProcessingError::NoVideoStream)
    ));
}
