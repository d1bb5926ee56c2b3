//! Request-level errors that never reach the pipeline.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No audio file provided. Send the recording in the multipart field 'audio'.")]
    MissingAudio,

    #[error("Unsupported file format. Please upload one of: .wav, .mp3, .ogg, .m4a")]
    UnsupportedFormat,

    #[error("Uploaded audio file is empty")]
    EmptyUpload,

    #[error("Invalid upload: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("Failed to encode response: {0}")]
    Encode(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingAudio
            | GatewayError::UnsupportedFormat
            | GatewayError::EmptyUpload => StatusCode::BAD_REQUEST,
            GatewayError::Multipart { status, .. } => *status,
            GatewayError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for GatewayError {
    fn from(err: MultipartError) -> Self {
        GatewayError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(target: "voxchat::gateway", "{}", self);
        } else {
            tracing::info!(target: "voxchat::gateway", status = status.as_u16(), "rejected upload: {}", self);
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
