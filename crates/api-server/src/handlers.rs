//! HTTP request handlers for API endpoints

use axum::{
    extract::{
        rejection::{MultipartRejection, PathRejection},
        Multipart, Path, State,
    },
    http::header,
    response::IntoResponse,
    Json,
};
use std::path::Path as FsPath;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    types::{HealthResponse, UploadResponse},
    ApiState,
};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Reduce a client-supplied file name to its final component
///
/// Returns `None` for empty names and names that are only directory parts.
fn sanitize_file_name(name: &str) -> Option<String> {
    FsPath::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Whether `component` can be joined onto a directory without escaping it
fn is_safe_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\', '\0'])
}

/// Accept a video upload, analyse it and return the report
///
/// The multipart body must contain a `file` part with a non-empty file name
/// and non-empty content. A body that is not multipart at all is answered
/// like a missing `file` part.
/// The upload is stored under `{upload_dir}/{request_id}/` and artifacts are
/// written to `{processed_dir}/{request_id}/`.
pub async fn upload_video(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected upload body: {}", e.body_text());
        ApiError::BadRequest("No file part".to_string())
    })?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().and_then(sanitize_file_name) else {
            return Err(ApiError::BadRequest("No selected file".to_string()));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, data));
        break;
    }
    let Some((file_name, data)) = upload else {
        return Err(ApiError::BadRequest("No file part".to_string()));
    };
    if data.is_empty() {
        return Err(ApiError::BadRequest("Empty file".to_string()));
    }

    let request_id = Uuid::new_v4().to_string();
    let upload_dir = state.config.upload_dir.join(&request_id);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(ApiError::storage)?;
    let video_path = upload_dir.join(&file_name);
    tokio::fs::write(&video_path, &data)
        .await
        .map_err(ApiError::storage)?;

    info!(
        "Upload {}: {} ({} bytes)",
        request_id,
        file_name,
        data.len()
    );

    let output_dir = state.config.processed_dir.join(&request_id);
    let pipeline = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || pipeline.run(&video_path, &output_dir))
        .await
        .map_err(|e| ApiError::Internal {
            error: "Failed to process video".to_string(),
            details: format!("Processing task failed: {e}"),
        })?
        .map_err(|e| {
            error!("Request {} failed: {}", request_id, e);
            ApiError::from(e)
        })?;

    info!(
        "Request {} complete: {} sampled frames, {} anomalies",
        request_id,
        report.scores.len(),
        report.frames_with_anomalies.len()
    );

    Ok(Json(UploadResponse::from_report(
        report,
        &request_id,
        &state.config.public_base_url,
    )))
}

/// Serve an artifact of a previous request
pub async fn get_artifact(
    State(state): State<ApiState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((request_id, filename)) = path.map_err(|e| {
        warn!("Rejected artifact path: {}", e.body_text());
        ApiError::BadRequest("Invalid artifact path".to_string())
    })?;
    if Uuid::parse_str(&request_id).is_err() || !is_safe_component(&filename) {
        warn!("Rejected artifact path {}/{}", request_id, filename);
        return Err(ApiError::BadRequest("Invalid artifact path".to_string()));
    }

    let path = state.config.processed_dir.join(&request_id).join(&filename);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!(
                "Artifact not found: {request_id}/{filename}"
            )));
        }
        Err(e) => return Err(ApiError::artifact_read(e)),
    };

    Ok(([(header::CONTENT_TYPE, content_type(&filename))], data))
}

fn content_type(filename: &str) -> &'static str {
    let extension = FsPath::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
