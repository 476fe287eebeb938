//! Centralized error handling for TrustLend
//!
//! One error type flows from the domain services up to the HTTP layer, where
//! it is mapped to a status code and a JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Lending error taxonomy with HTTP status code mapping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Eligibility error: {0}")]
    Eligibility(String),

    #[error("Role error: {0}")]
    Role(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LendingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn role(message: impl Into<String>) -> Self {
        Self::Role(message.into())
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            LendingError::Validation(_) => "VALIDATION_ERROR",
            LendingError::Eligibility(_) => "ELIGIBILITY_ERROR",
            LendingError::Role(_) => "ROLE_ERROR",
            LendingError::Conflict(_) => "CONFLICT",
            LendingError::State(_) => "STATE_ERROR",
            LendingError::NotFound(_) => "NOT_FOUND",
            LendingError::Gateway(_) => "GATEWAY_ERROR",
            LendingError::Unauthorized(_) => "UNAUTHORIZED",
            LendingError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            LendingError::Validation(_) => StatusCode::BAD_REQUEST,
            LendingError::Eligibility(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LendingError::Role(_) => StatusCode::FORBIDDEN,
            LendingError::Conflict(_) => StatusCode::CONFLICT,
            LendingError::State(_) => StatusCode::CONFLICT,
            LendingError::NotFound(_) => StatusCode::NOT_FOUND,
            LendingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            LendingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LendingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure originated on our side rather than in the request
    pub fn is_server_error(&self) -> bool {
        matches!(self, LendingError::Database(_) | LendingError::Gateway(_))
    }
}

impl IntoResponse for LendingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(error = %message, code = %error_code, "Server error occurred");
        } else {
            tracing::debug!(error = %message, code = %error_code, "Client error occurred");
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for LendingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LendingError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                LendingError::Conflict(db_err.message().to_string())
            }
            _ => LendingError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for LendingError {
    fn from(err: validator::ValidationErrors) -> Self {
        LendingError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for LendingError {
    fn from(err: reqwest::Error) -> Self {
        LendingError::Gateway(err.to_string())
    }
}

impl From<serde_json::Error> for LendingError {
    fn from(err: serde_json::Error) -> Self {
        LendingError::Validation(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using LendingError
pub type LendingResult<T> = Result<T, LendingError>;
