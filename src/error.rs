use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::{
    auth::{jwt::VerificationFailure, password::PasswordError},
    storage::StorageError,
};

/// Which unique field a registration collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictField::Username => f.write_str("Username"),
            ConflictField::Email => f.write_str("Email"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} already exists")]
    Conflict(ConflictField),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Verification(#[from] VerificationFailure),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "rejected request body");
        AppError::Validation("Invalid request body".into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Verification(VerificationFailure::Missing) => (
                StatusCode::UNAUTHORIZED,
                "Authentication token is required".to_string(),
            ),
            AppError::Verification(VerificationFailure::InvalidOrExpired) => (
                StatusCode::FORBIDDEN,
                "Invalid or expired token".to_string(),
            ),
            AppError::Storage(_)
            | AppError::Password(_)
            | AppError::Token(_)
            | AppError::Task(_) => {
                // Full detail stays in the server log.
                error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
