//! HTTP error responses

use crate::types::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deepfake_common::ProcessingError;
use thiserror::Error;

/// Errors returned by request handlers, always rendered as JSON
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{error}: {details}")]
    Internal { error: String, details: String },
}

impl ApiError {
    /// Failure to persist an upload
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Internal {
            error: "Failed to store upload".to_string(),
            details: err.to_string(),
        }
    }

    /// Failure to read a stored artifact back
    pub fn artifact_read(err: impl std::fmt::Display) -> Self {
        Self::Internal {
            error: "Failed to read artifact".to_string(),
            details: err.to_string(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        Self::Internal {
            error: "Failed to process video".to_string(),
            details: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(error) | Self::NotFound(error) => ErrorResponse {
                error,
                details: None,
            },
            Self::Internal { error, details } => ErrorResponse {
                error,
                details: Some(details),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("No file part".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ProcessingError::NoVideoStream).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_processing_error_details() {
        let err = ApiError::from(ProcessingError::Timeout(600));
        match err {
            ApiError::Internal { error, details } => {
                assert_eq!(error, "Failed to process video");
                assert_eq!(details, "Processing timeout after 600s");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_storage_and_read_messages_differ() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        match ApiError::artifact_read(&io) {
            ApiError::Internal { error, details } => {
                assert_eq!(error, "Failed to read artifact");
                assert_eq!(details, "denied");
            }
            other => panic!("unexpected {other:?}"),
        }
        match ApiError::storage(&io) {
            ApiError::Internal { error, .. } => assert_eq!(error, "Failed to store upload"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
