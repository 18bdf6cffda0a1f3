//! Request handlers.

pub mod auth;

use axum::http::Uri;

use crate::error::{AppError, ConnectCode, ConnectError};

/// Fallback for routes this server does not serve. Runs behind the gateway
/// middleware, so anonymous callers see 401 before they see 404.
pub async fn not_found() -> AppError {
    AppError::NotFound("no such route".into())
}

/// Connect methods outside the auth surface. Admitted by the gate like any
/// other call, then answered with `unimplemented`.
pub async fn unimplemented(uri: Uri) -> ConnectError {
    ConnectError::new(
        ConnectCode::Unimplemented,
        format!("{} is not served here", uri.path()),
    )
}
