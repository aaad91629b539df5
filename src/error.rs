use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::ApiResponse;

// ============================================================================
// Error Taxonomy
// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to fetch subscription: {0}")]
    Fetch(String),

    #[error("Unable to parse subscription content as JSON, YAML, or base64 encoded YAML")]
    UnparsableSubscription,

    #[error("No valid subscriptions found")]
    NoValidSubscriptions,

    #[error("Mihomo is already running")]
    AlreadyRunning,

    #[error("Mihomo is not running")]
    NotRunning,

    #[error("Mihomo binary not found. Please install mihomo first.")]
    BinaryNotFound,

    #[error("Configuration file not found. Please setup configuration first.")]
    ConfigMissing,

    #[error("Failed to start mihomo: {output}")]
    StartupFailed { output: String },

    #[error("Mihomo API unreachable: {0}")]
    ControlApiUnreachable(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Fetch(_)
            | AppError::UnparsableSubscription
            | AppError::ControlApiUnreachable(_) => StatusCode::BAD_GATEWAY,
            AppError::NoValidSubscriptions
            | AppError::AlreadyRunning
            | AppError::NotRunning
            | AppError::BinaryNotFound
            | AppError::ConfigMissing => StatusCode::BAD_REQUEST,
            AppError::StartupFailed { .. }
            | AppError::Yaml(_)
            | AppError::Json(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Every failed operation becomes a structured response; nothing bubbles up
// as a bare 500 without a message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
