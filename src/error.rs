//! Error types for trim jobs, configuration and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type TrimResult<T> = Result<T, TrimError>;

/// Failures of the trim pipeline, from input validation to the external tools.
#[derive(Debug, Error)]
pub enum TrimError {
    #[error("malformed time value: {0:?}")]
    MalformedTime(String),

    #[error("unrecognized YouTube URL: {0}")]
    UnrecognizedUrl(String),

    #[error("invalid range: end ({end}) must be after start ({start}) and both non-negative")]
    InvalidRange { start: f64, end: f64 },

    #[error("a trimming operation is already in progress")]
    AlreadyInProgress,

    #[error("could not resolve video title: {0}")]
    TitleResolutionFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("cut failed: {0}")]
    CutFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrimError {
    /// Input problems the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrimError::MalformedTime(_) | TrimError::UnrecognizedUrl(_) | TrimError::InvalidRange { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrimError> for ApiError {
    fn from(err: TrimError) -> Self {
        match err {
            e if e.is_validation() => ApiError::BadRequest(e.to_string()),
            e @ TrimError::AlreadyInProgress => ApiError::Conflict(e.to_string()),
            e => ApiError::Internal(format!("Failed to start video trimming: {e}")),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse { detail: self.to_string() };
        (status, Json(body)).into_response()
    }
}
