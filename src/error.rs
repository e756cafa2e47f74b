//! # Error Handling Module
//!
//! Provides structured error types for Laserscribe operations.
//! Database constraint violations are classified by SQLite error code,
//! never by matching on error message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for Laserscribe operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Comprehensive error type for all Laserscribe operations
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing input (bad JSON fields, non-numeric path params)
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed, or unverifiable credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness conflict (duplicate user, duplicate configuration key)
    #[error("{0}")]
    Conflict(String),

    /// Database connection or query errors
    #[error("database error: {0}")]
    Database(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    /// Replaces the generic conflict message with a domain-specific one,
    /// leaving every other error untouched.
    pub fn on_conflict(self, msg: &str) -> Self {
        match self {
            ApiError::Conflict(_) => ApiError::Conflict(msg.to_string()),
            other => other,
        }
    }

}

/// Converts ApiError into an Axum HTTP response.
///
/// Server-side failures respond with a generic message; the concrete error
/// goes to the log only.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Classify rusqlite errors by SQLite result code.
///
/// Unique/primary-key violations surface as 409, foreign-key violations as
/// 404 (the referenced row does not exist); everything else is a 500.
impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return match e.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        ApiError::Conflict("resource already exists".to_string())
                    }
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        ApiError::NotFound("referenced resource not found".to_string())
                    }
                    _ => ApiError::Database(err.to_string()),
                };
            }
        }
        ApiError::Database(err.to_string())
    }
}

/// Convert tokio-rusqlite errors, unwrapping the inner rusqlite error so
/// constraint classification still applies.
impl From<tokio_rusqlite::Error> for ApiError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => e.into(),
            other => ApiError::Database(other.to_string()),
        }
    }
}
