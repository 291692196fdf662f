//! Error types shared by the stores, the storage gateway and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or empty request fields.
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed or expired session, or a session whose user is gone.
    #[error("{0}")]
    Unauthenticated(String),

    /// Wrong email/password pair. `needs_password` is set for Google-only accounts.
    #[error("Invalid credentials")]
    InvalidCredentials { needs_password: bool },

    #[error("User already exists")]
    DuplicateEmail,

    /// Operation not permitted in the account's current state.
    #[error("{0}")]
    InvalidState(String),

    /// Rejected identity-provider token.
    #[error("{0}")]
    InvalidToken(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("File too large (max {limit} bytes)")]
    PayloadTooLarge { limit: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::DuplicateEmail
            | AppError::InvalidState(_)
            | AppError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::InvalidCredentials { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    needs_password: Option<bool>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            match self {
                AppError::Storage(_) => "Storage operation failed".to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };

        let needs_password = match self {
            AppError::InvalidCredentials {
                needs_password: true,
            } => Some(true),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message,
            needs_password,
        };
        (status, Json(body)).into_response()
    }
}
