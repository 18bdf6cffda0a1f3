//! Application error types.
//!
//! REST routes answer with [`AppError`]; Connect routes with
//! [`ConnectError`]. Both are built from [`AuthError::kind`], so the two
//! transports reject the same requests with the same class of error.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use memo_core::auth::{AuthError, ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// REST error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let message = e.public_message();
        match e.kind() {
            ErrorKind::Unauthenticated => AppError::Unauthorized(message),
            ErrorKind::PermissionDenied => AppError::Forbidden(message),
            ErrorKind::InvalidArgument => AppError::Validation(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Internal => {
                error!(error = %e, "internal error");
                AppError::Internal(e.to_string())
            }
        }
    }
}

/// Connect protocol error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectCode {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Unimplemented,
    Internal,
}

impl ConnectCode {
    /// HTTP status paired with each code by the Connect protocol.
    pub fn http_status(self) -> StatusCode {
        match self {
            ConnectCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ConnectCode::NotFound => StatusCode::NOT_FOUND,
            ConnectCode::PermissionDenied => StatusCode::FORBIDDEN,
            ConnectCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ConnectCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ConnectCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorKind> for ConnectCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Unauthenticated => ConnectCode::Unauthenticated,
            ErrorKind::PermissionDenied => ConnectCode::PermissionDenied,
            ErrorKind::InvalidArgument => ConnectCode::InvalidArgument,
            ErrorKind::NotFound => ConnectCode::NotFound,
            ErrorKind::Internal => ConnectCode::Internal,
        }
    }
}

/// Connect error, serialized as `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ConnectError {
    pub code: ConnectCode,
    pub message: String,
}

impl ConnectError {
    pub fn new(code: ConnectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<AuthError> for ConnectError {
    fn from(e: AuthError) -> Self {
        if e.kind() == ErrorKind::Internal {
            error!(error = %e, "internal error");
        }
        ConnectError::new(e.kind().into(), e.public_message())
    }
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        (self.code.http_status(), Json(self)).into_response()
    }
}
