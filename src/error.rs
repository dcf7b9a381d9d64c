//! Request-level error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Everything that can terminate an `/evaluate` request.
#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("No images part in the request")]
    NoImages,

    #[error("No selected files")]
    EmptySelection,

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Malformed multipart request: {0}")]
    Multipart(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("OCR service error: {0}")]
    OcrService(String),

    #[error("Correction service error: {0}")]
    CorrectionService(String),

    #[error("Evaluation service error: {0}")]
    EvaluationService(String),

    #[error("AI detection service error: {0}")]
    DetectionService(String),

    #[error("Scratch storage error: {0}")]
    Storage(String),
}

impl EvaluateError {
    /// Client input problems are rejected before any service call.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoImages
                | Self::EmptySelection
                | Self::InvalidFileType(_)
                | Self::Multipart(_)
                | Self::PayloadTooLarge(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if matches!(self, Self::PayloadTooLarge(_)) {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<std::io::Error> for EvaluateError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl IntoResponse for EvaluateError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
