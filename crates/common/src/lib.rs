/// Common types and utilities for deepfake video analysis
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Message reported in place of summary statistics when no frame produced a score
pub const NO_DATA_MESSAGE: &str = "No frames with valid scores detected.";

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to open video: {0}")]
    OpenFailed(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Classification failed for frame {frame_index}: {message}")]
    ClassificationFailed { frame_index: u64, message: String },

    #[error(
        "Frame dimension mismatch in {frame}: expected {expected_width}x{expected_height}, found {width}x{height}"
    )]
    DimensionMismatch {
        frame: String,
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Video encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Processing timeout after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// A single `{label, score}` pair as produced by an image classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Normalized classifier output for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Confidence that the frame is authentic (0.0-1.0)
    pub real_score: f32,
    /// Confidence that the frame is synthetic (0.0-1.0)
    pub fake_score: f32,
}

impl ClassificationResult {
    #[must_use]
    pub fn new(real_score: f32, fake_score: f32) -> Self {
        Self {
            real_score,
            fake_score,
        }
    }

    /// A frame is anomalous when the fake score strictly exceeds the real score.
    #[must_use]
    pub fn is_anomaly(&self) -> bool {
        self.fake_score > self.real_score
    }

    /// Whether either score reaches `threshold`
    #[must_use]
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.real_score >= threshold || self.fake_score >= threshold
    }
}

/// A sampled frame flagged as likely synthetic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub frame_index: u64,
    pub real_score: f32,
    pub fake_score: f32,
    /// Annotated frame image written for this anomaly
    pub frame_artifact: PathBuf,
}

/// Per-frame scores in ascending frame-index order
///
/// The three vectors always have the same length; `push` rejects indices that
/// would break the ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreSeries {
    real_scores: Vec<f32>,
    fake_scores: Vec<f32>,
    frame_indices: Vec<u64>,
}

impl ScoreSeries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            real_scores: Vec::with_capacity(capacity),
            fake_scores: Vec::with_capacity(capacity),
            frame_indices: Vec::with_capacity(capacity),
        }
    }

    /// Append the scores of one frame
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if `frame_index` is not greater
    /// than the last index already in the series.
    pub fn push(&mut self, frame_index: u64, result: ClassificationResult) -> Result<()> {
        if let Some(&last) = self.frame_indices.last() {
            if frame_index <= last {
                return Err(ProcessingError::InvalidInput(format!(
                    "frame index {frame_index} does not follow {last}"
                )));
            }
        }
        self.frame_indices.push(frame_index);
        self.real_scores.push(result.real_score);
        self.fake_scores.push(result.fake_score);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frame_indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame_indices.is_empty()
    }

    #[must_use]
    pub fn real_scores(&self) -> &[f32] {
        &self.real_scores
    }

    #[must_use]
    pub fn fake_scores(&self) -> &[f32] {
        &self.fake_scores
    }

    #[must_use]
    pub fn frame_indices(&self) -> &[u64] {
        &self.frame_indices
    }
}

/// Video-level counts derived from a completed [`ScoreSeries`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_frames: usize,
    pub real_count: usize,
    pub fake_count: usize,
    pub real_percentage: f64,
    pub fake_percentage: f64,
}

/// Final verdict: statistics, or a "no data" marker for an empty series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalScores {
    Summary(SummaryStatistics),
    NoData { error: String },
}

impl FinalScores {
    #[must_use]
    pub fn no_data() -> Self {
        FinalScores::NoData {
            error: NO_DATA_MESSAGE.to_string(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SummaryStatistics> {
        match self {
            FinalScores::Summary(stats) => Some(stats),
            FinalScores::NoData { .. } => None,
        }
    }
}

/// Complete result of analysing one video
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub frames_with_anomalies: Vec<AnomalyRecord>,
    #[serde(flatten)]
    pub scores: ScoreSeries,
    pub final_scores: FinalScores,
    /// Assembled video of anomaly frames, if any anomaly was found
    pub output_video: Option<PathBuf>,
    /// Total frame count reported by the container
    pub total_video_frames: u64,
    /// Stride used when sampling frames
    pub frame_skip: u64,
}
