//! Error taxonomy shared by the registry, the service and the HTTP layer.
//!
//! Every failure path returns a typed [`AppError`] carrying the offending id
//! and, where there is one, the underlying driver error as its `source`.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use validator::ValidationErrors;

use crate::context::Interrupted;
use crate::response::ApiResponse;

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid database type: {0}")]
    InvalidDatabaseType(String),

    #[error("missing credentials for database {0}")]
    MissingCredentials(String),

    #[error("database {0} already connected")]
    AlreadyConnected(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("database {0} is not connected")]
    NotConnected(String),

    #[error("failed to connect to {id}: {source}")]
    ConnectionFailed {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("query execution failed on {id}: {source}")]
    QueryFailed {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("operation on {id} interrupted: {source}")]
    Interrupted {
        id: String,
        #[source]
        source: Interrupted,
    },

    #[error("failed to close connection {id}: {source}")]
    CloseFailed {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("errors during disconnect: {0}")]
    ShutdownIncomplete(CloseFailures),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn connection_failed(id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ConnectionFailed {
            id: id.into(),
            source: source.into(),
        }
    }

    pub fn query_failed(id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::QueryFailed {
            id: id.into(),
            source: source.into(),
        }
    }

    pub fn close_failed(id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::CloseFailed {
            id: id.into(),
            source: source.into(),
        }
    }

    pub fn interrupted(id: impl Into<String>, source: Interrupted) -> Self {
        Self::Interrupted {
            id: id.into(),
            source,
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_)
            | AppError::InvalidDatabaseType(_)
            | AppError::MissingCredentials(_) => "VALIDATION_ERROR",
            AppError::AlreadyConnected(_) => "CONFLICT",
            AppError::DatabaseNotFound(_) => "NOT_FOUND",
            AppError::NotConnected(_) => "NOT_CONNECTED",
            AppError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            AppError::QueryFailed { .. } => "QUERY_FAILED",
            AppError::Interrupted { .. } => "TIMEOUT",
            AppError::CloseFailed { .. }
            | AppError::ShutdownIncomplete(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidDatabaseType(_)
            | AppError::MissingCredentials(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyConnected(_) => StatusCode::CONFLICT,
            AppError::DatabaseNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConnectionFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::Interrupted { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::QueryFailed { .. }
            | AppError::CloseFailed { .. }
            | AppError::ShutdownIncomplete(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller can fix the request and resend it.
    pub fn is_validation(&self) -> bool {
        self.status_code() == StatusCode::BAD_REQUEST
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

/// One connection that failed to close during a bulk disconnect.
#[derive(Debug)]
pub struct CloseFailure {
    pub id: String,
    pub source: BoxError,
}

/// Every close failure collected by a bulk disconnect.
#[derive(Debug, Default)]
pub struct CloseFailures(pub Vec<CloseFailure>);

impl CloseFailures {
    pub fn push(&mut self, id: impl Into<String>, source: impl Into<BoxError>) {
        self.0.push(CloseFailure {
            id: id.into(),
            source: source.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.id.as_str())
    }
}

impl fmt::Display for CloseFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "failed to close {}: {}", failure.id, failure.source)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidDatabaseType("mongo".into()), StatusCode::BAD_REQUEST),
            (AppError::MissingCredentials("a".into()), StatusCode::BAD_REQUEST),
            (AppError::AlreadyConnected("a".into()), StatusCode::CONFLICT),
            (AppError::DatabaseNotFound("a".into()), StatusCode::NOT_FOUND),
            (AppError::NotConnected("a".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::connection_failed("a", "refused"), StatusCode::BAD_GATEWAY),
            (AppError::query_failed("a", "syntax"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::interrupted("a", Interrupted::DeadlineExceeded),
                StatusCode::REQUEST_TIMEOUT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn test_source_is_preserved() {
        let err = AppError::connection_failed("pg1", "connection refused");
        assert_eq!(err.to_string(), "failed to connect to pg1: connection refused");
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }

    #[test]
    fn test_close_failures_display() {
        let mut failures = CloseFailures::default();
        failures.push("a", "boom");
        failures.push("b", "stuck");
        let err = AppError::ShutdownIncomplete(failures);
        assert_eq!(
            err.to_string(),
            "errors during disconnect: failed to close a: boom; failed to close b: stuck"
        );
    }
}
