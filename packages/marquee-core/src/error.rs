//! Centralized error types for the Marquee core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Application-wide error type for the Marquee server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SignageError {
    /// Entity id unknown.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate unique constraint (e.g. client slug).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Protected resource (delete of the bootstrap tenant).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or mis-typed required field, invalid time window, etc.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `play` invoked on a playlist with no items.
    #[error("Playlist has no items: {0}")]
    EmptyPlaylist(String),

    /// External signal endpoint unreachable. Logged and swallowed inside
    /// collectors; never propagated to HTTP callers.
    #[error("Dependency failed: {0}")]
    DependencyFailed(String),

    /// Unexpected persistence or runtime failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignageError {
    /// Returns the string-tagged error kind for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EmptyPlaylist(_) => "EMPTY_PLAYLIST",
            Self::DependencyFailed(_) => "DEPENDENCY_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) | Self::EmptyPlaylist(_) => StatusCode::BAD_REQUEST,
            Self::DependencyFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SignageResult<T> = Result<T, SignageError>;

impl IntoResponse for SignageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            },
        });
        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for SignageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("row not found".into()),
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(msg.unwrap_or_else(|| "constraint violation".into()))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SignageError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_kinds() {
        assert_eq!(SignageError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(SignageError::Conflict("x".into()).code(), "CONFLICT");
        assert_eq!(
            SignageError::EmptyPlaylist("x".into()).code(),
            "EMPTY_PLAYLIST"
        );
    }

    #[test]
    fn status_codes_map_to_http() {
        assert_eq!(
            SignageError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SignageError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SignageError::EmptyPlaylist("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SignageError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn no_rows_becomes_not_found() {
        let err: SignageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
