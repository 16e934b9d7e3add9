//! Error handling for the camera relay

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera configuration has unset fields
    #[error("Camera configuration is incomplete")]
    ConfigIncomplete,

    /// A recording is already active
    #[error("Recording already in progress")]
    AlreadyRecording,

    /// The camera stream could not be opened
    #[error("Unable to open camera stream: {0}")]
    SourceUnavailable(String),

    /// The external encoder process could not be started
    #[error("Failed to launch encoder: {0}")]
    EncoderLaunch(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::ConfigIncomplete => (
                StatusCode::BAD_REQUEST,
                "CONFIG_INCOMPLETE",
                self.to_string(),
            ),
            Error::AlreadyRecording => {
                (StatusCode::CONFLICT, "ALREADY_RECORDING", self.to_string())
            }
            Error::SourceUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "SOURCE_UNAVAILABLE",
                self.to_string(),
            ),
            Error::EncoderLaunch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENCODER_LAUNCH_FAILED",
                self.to_string(),
            ),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "error": message
        }));

        (status, body).into_response()
    }
}
