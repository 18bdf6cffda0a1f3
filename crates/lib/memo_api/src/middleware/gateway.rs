//! REST gateway middleware.
//!
//! Maps `(method, path)` to an operation name through a static route table,
//! folds a `?token=` query parameter into `Authorization: Bearer` for
//! clients that cannot set headers (EventSource), then runs the gate.

use std::collections::HashMap;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use memo_core::auth::policy::ops;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// `{}` matches exactly one non-empty path segment.
const ROUTES: &[(&str, &str, &str)] = &[
    ("POST", "/api/v1/auth/signin", ops::SIGN_IN),
    ("POST", "/api/v1/auth/signout", ops::SIGN_OUT),
    ("POST", "/api/v1/auth/refresh", ops::REFRESH_TOKEN),
    ("GET", "/api/v1/auth/me", ops::GET_CURRENT_USER),
    ("GET", "/api/v1/auth/sessions", ops::LIST_USER_SESSIONS),
    ("DELETE", "/api/v1/auth/sessions/{}", ops::REVOKE_USER_SESSION),
    ("GET", "/api/v1/auth/access-tokens", ops::LIST_PERSONAL_ACCESS_TOKENS),
    ("POST", "/api/v1/auth/access-tokens", ops::CREATE_PERSONAL_ACCESS_TOKEN),
    ("DELETE", "/api/v1/auth/access-tokens/{}", ops::DELETE_PERSONAL_ACCESS_TOKEN),
    ("GET", "/api/v1/instance/profile", ops::GET_INSTANCE_PROFILE),
    ("GET", "/api/v1/instance/settings/{}", ops::GET_INSTANCE_SETTING),
    ("PATCH", "/api/v1/instance/settings/{}", ops::UPDATE_INSTANCE_SETTING),
    ("GET", "/api/v1/users", ops::LIST_USERS),
    ("POST", "/api/v1/users", ops::CREATE_USER),
    ("GET", "/api/v1/users/{}", ops::GET_USER),
    ("DELETE", "/api/v1/users/{}", ops::DELETE_USER),
    ("GET", "/api/v1/users/{}/avatar", ops::GET_USER_AVATAR),
    ("GET", "/api/v1/memos", ops::LIST_MEMOS),
    ("GET", "/api/v1/memos/{}", ops::GET_MEMO),
    ("GET", "/api/v1/memos/{}/comments", ops::LIST_MEMO_COMMENTS),
    ("GET", "/api/v1/memos/{}/reactions", ops::LIST_MEMO_REACTIONS),
    ("GET", "/file/attachments/{}/{}", ops::GET_ATTACHMENT_BINARY),
    ("GET", "/api/v1/identity-providers", ops::LIST_IDENTITY_PROVIDERS),
    ("POST", "/api/v1/identity-providers", ops::CREATE_IDENTITY_PROVIDER),
    ("PATCH", "/api/v1/identity-providers/{}", ops::UPDATE_IDENTITY_PROVIDER),
    ("DELETE", "/api/v1/identity-providers/{}", ops::DELETE_IDENTITY_PROVIDER),
];

/// The whole route table as `(method, pattern, operation)`.
pub fn routes() -> &'static [(&'static str, &'static str, &'static str)] {
    ROUTES
}

/// Operation served by a REST route, if the route is known.
pub fn operation_for(method: &Method, path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    ROUTES
        .iter()
        .find(|(m, pattern, _)| *m == method.as_str() && matches_pattern(pattern, &segments))
        .map(|(_, _, op)| *op)
}

fn matches_pattern(pattern: &str, segments: &[&str]) -> bool {
    let parts: Vec<&str> = pattern.split('/').collect();
    parts.len() == segments.len()
        && parts
            .iter()
            .zip(segments)
            .all(|(p, s)| if *p == "{}" { !s.is_empty() } else { p == s })
}

/// Copy `?token=` into `Authorization: Bearer` unless the header is already set.
fn fold_token_param(request: &mut Request) {
    if request.headers().contains_key(AUTHORIZATION) {
        return;
    }
    let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(request.uri()) else {
        return;
    };
    let Some(token) = params.get("token").filter(|t| !t.is_empty()) else {
        return;
    };
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(value) => {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(e) => debug!(error = %e, "ignoring unusable token query parameter"),
    }
}

/// Axum middleware: authenticate and authorize a REST call.
pub async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    fold_token_param(&mut request);
    let operation = operation_for(request.method(), request.uri().path());
    match super::admit(&state.gate, operation, request, next).await {
        Ok(response) => response,
        Err(e) => AppError::from(e).into_response(),
    }
}
