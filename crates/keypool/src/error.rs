// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::wait::WaitStatus;

/// Errors surfaced by the lease manager and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The deadline passed with no grant. Callers may retry.
    #[error("[{scope}] timed out after {waited_ms}ms waiting for capacity ({reason})")]
    Timeout { scope: String, waited_ms: u64, reason: String, last: Option<Box<WaitStatus>> },
    /// `wait = false` and the request could not be admitted right now.
    #[error("[{scope}] no capacity available ({reason})")]
    Unavailable { scope: String, reason: String, status: Box<WaitStatus> },
    /// Malformed catalog input. Not retryable.
    #[error("invalid catalog: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// A persisted row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PoolError {
    pub(crate) fn timeout(scope: &str, waited_ms: u64, last: Option<WaitStatus>) -> Self {
        let reason = last.as_ref().map(|s| s.code().to_owned()).unwrap_or_else(|| "unknown".into());
        Self::Timeout { scope: scope.to_owned(), waited_ms, reason, last: last.map(Box::new) }
    }

    pub(crate) fn unavailable(scope: &str, status: WaitStatus) -> Self {
        Self::Unavailable {
            scope: scope.to_owned(),
            reason: status.code().to_owned(),
            status: Box::new(status),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. } | Self::Store(_))
    }

    /// The last structured wait status, for timeouts and unavailability.
    pub fn wait_status(&self) -> Option<&WaitStatus> {
        match self {
            Self::Timeout { last, .. } => last.as_deref(),
            Self::Unavailable { status, .. } => Some(status.as_ref()),
            _ => None,
        }
    }
}

/// Error codes for the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    Timeout,
    NoCapacity,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Timeout => 408,
            Self::NoCapacity => 429,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::NoCapacity => "NO_CAPACITY",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message), status: None };
        (status, Json(body))
    }
}

impl From<&PoolError> for ErrorCode {
    fn from(err: &PoolError) -> Self {
        match err {
            PoolError::Timeout { .. } => Self::Timeout,
            PoolError::Unavailable { .. } => Self::NoCapacity,
            PoolError::Config(_) => Self::BadRequest,
            PoolError::Store(_) | PoolError::Corrupt(_) | PoolError::Task(_) => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    /// Last wait status for capacity errors, so callers can show why.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WaitStatus>,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Render a [`PoolError`] as an HTTP response, carrying any wait status.
pub fn pool_error_response(err: &PoolError) -> (StatusCode, Json<ErrorResponse>) {
    let code = ErrorCode::from(err);
    let (status, Json(mut body)) = code.to_http_response(err.to_string());
    body.status = err.wait_status().cloned();
    (status, Json(body))
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
