// src/server/error.rs
//! RFC 7807 problem documents for API failures

use crate::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Problem details body (`application/problem+json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Error type URI
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable title
    pub title: String,
    /// HTTP status code
    pub status: u16,
    /// Detailed description
    pub detail: String,
    /// Request path that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Additional error-specific data, such as partial progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl Problem {
    pub fn new(kind: &str, title: &str, status: u16, detail: &str) -> Self {
        Self {
            error_type: format!("urn:scullery:error:{}", kind),
            title: title.to_string(),
            status,
            detail: detail.to_string(),
            instance: None,
            extensions: None,
        }
    }

    pub fn bad_request(detail: &str) -> Self {
        Self::new("invalid_request", "Bad Request", 400, detail)
    }

    pub fn internal(detail: &str) -> Self {
        Self::new("internal", "Internal Error", 500, detail)
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_extensions(mut self, extensions: serde_json::Value) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

impl From<&Error> for Problem {
    fn from(err: &Error) -> Self {
        let (status, title) = status_for(err);
        let problem = Problem::new(err.kind(), title, status.as_u16(), &err.to_string());

        match err {
            Error::PackageNotFound { package, tried } => problem.with_extensions(serde_json::json!({
                "package": package,
                "tried": tried,
            })),
            Error::PinningError { revision, .. } => {
                problem.with_extensions(serde_json::json!({ "revision": revision }))
            }
            Error::SpawnError { program, .. } => {
                problem.with_extensions(serde_json::json!({ "program": program }))
            }
            Error::CommandFailed { command, exit_code, .. } => problem.with_extensions(
                serde_json::json!({ "command": command, "exit_code": exit_code }),
            ),
            Error::TimeoutError(secs) => {
                problem.with_extensions(serde_json::json!({ "timeout_secs": secs }))
            }
            _ => problem,
        }
    }
}

fn status_for(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::NotFound(_) | Error::PackageNotFound { .. } => (StatusCode::NOT_FOUND, "Not Found"),
        Error::SessionBusy(_) => (StatusCode::CONFLICT, "Session Busy"),
        Error::PathEscape(_)
        | Error::UnsupportedUrl(_)
        | Error::InvalidRecipe(_)
        | Error::InvalidPackageName(_)
        | Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
        Error::PinningError { .. } | Error::GitError(_) => (StatusCode::BAD_GATEWAY, "Upstream Failure"),
        Error::CommandFailed { .. } => (StatusCode::BAD_GATEWAY, "Build Tool Failure"),
        Error::TimeoutError(_) => (StatusCode::GATEWAY_TIMEOUT, "Timed Out"),
        Error::AllocationError(_)
        | Error::SpawnError { .. }
        | Error::ConfigError(_)
        | Error::IoError(_)
        | Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
    }
}

/// Error response wrapper
#[derive(Debug)]
pub struct ApiError(pub Problem);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(Problem::from(&err))
    }
}

impl From<Problem> for ApiError {
    fn from(problem: Problem) -> Self {
        ApiError(problem)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::warn!(kind = %self.0.error_type, "{}", self.0.detail);
        }

        (
            status,
            [("content-type", "application/problem+json")],
            Json(self.0),
        )
            .into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
