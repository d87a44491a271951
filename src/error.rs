use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Upstream Errors
///
/// Failures talking to the catalog are split by stage so callers can tell a
/// transport problem from a payload problem:
///
/// - `UpstreamFetch` - Transport failure, timeout, or non-success status
/// - `UpstreamDecode` - The catalog answered, but not with the expected JSON
///
/// Both surface the underlying cause to the client; it describes the
/// catalog's behavior, not ours.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Error fetching data: {0}")]
    UpstreamFetch(String),

    #[error("Error decoding data: {0}")]
    UpstreamDecode(String),

    #[error("Error generating token: {0}")]
    TokenSigning(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body shared by handlers and middleware.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::UpstreamFetch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_fetch_failed",
                self.to_string(),
            ),
            AppError::UpstreamDecode(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_decode_failed",
                self.to_string(),
            ),

            // Signing failures never leak key material or library details
            AppError::TokenSigning(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "token_error",
                "Error generating token".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Service configuration error. Please contact support.".to_string(),
            ),

            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, axum::Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
