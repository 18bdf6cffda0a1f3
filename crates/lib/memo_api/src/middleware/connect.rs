//! Connect interceptor.
//!
//! Connect unary calls are `POST /{package}.{Service}/{Method}`, so the URL
//! path is already the operation name.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::error::ConnectError;

/// Axum middleware: authenticate and authorize a Connect call.
pub async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let operation = request.uri().path().to_string();
    match super::admit(&state.gate, Some(&operation), request, next).await {
        Ok(response) => response,
        Err(e) => ConnectError::from(e).into_response(),
    }
}
