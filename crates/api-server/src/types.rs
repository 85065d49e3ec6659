//! API request and response types

use deepfake_common::{AnalysisReport, AnomalyRecord, FinalScores};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Anomaly frame as exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFrame {
    pub frame_index: u64,
    pub real_score: f32,
    pub fake_score: f32,
    /// Where the annotated frame can be fetched
    pub frame_url: Option<String>,
}

/// Response to a successful `POST /upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub frames_with_anomalies: Vec<AnomalyFrame>,
    pub real_scores: Vec<f32>,
    pub fake_scores: Vec<f32>,
    pub frame_indices: Vec<u64>,
    pub final_scores: FinalScores,
    pub output_video_url: Option<String>,
    pub request_id: String,
    pub total_video_frames: u64,
    pub frame_skip: u64,
}

/// URL of `filename` in the artifact directory of `request_id`
#[must_use]
pub fn artifact_url(base_url: &str, request_id: &str, filename: &str) -> String {
    format!("{base_url}/processed/{request_id}/{filename}")
}

fn artifact_url_for(base_url: &str, request_id: &str, path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| artifact_url(base_url, request_id, name))
}

impl AnomalyFrame {
    fn from_record(record: &AnomalyRecord, base_url: &str, request_id: &str) -> Self {
        Self {
            frame_index: record.frame_index,
            real_score: record.real_score,
            fake_score: record.fake_score,
            frame_url: artifact_url_for(base_url, request_id, &record.frame_artifact),
        }
    }
}

impl UploadResponse {
    /// Build the HTTP response for a finished analysis
    #[must_use]
    pub fn from_report(report: AnalysisReport, request_id: &str, base_url: &str) -> Self {
        Self {
            frames_with_anomalies: report
                .frames_with_anomalies
                .iter()
                .map(|record| AnomalyFrame::from_record(record, base_url, request_id))
                .collect(),
            real_scores: report.scores.real_scores().to_vec(),
            fake_scores: report.scores.fake_scores().to_vec(),
            frame_indices: report.scores.frame_indices().to_vec(),
            final_scores: report.final_scores,
            output_video_url: report
                .output_video
                .as_deref()
                .and_then(|path| artifact_url_for(base_url, request_id, path)),
            request_id: request_id.to_string(),
            total_video_frames: report.total_video_frames,
            frame_skip: report.frame_skip,
        }
    }
}
