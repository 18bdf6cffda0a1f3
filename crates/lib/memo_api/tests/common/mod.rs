//! Shared router fixture: an in-memory store with a host and a regular user.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use memo_api::config::ApiConfig;
use memo_api::{AppState, router};
use memo_core::auth::password::hash_password;
use memo_core::models::auth::{Role, RowStatus, User};
use memo_core::store::memory::MemoryStore;
use tower::ServiceExt;

pub const PASSWORD: &str = "hunter2-but-longer";

pub struct Fixture {
    pub app: Router,
    pub store: Arc<MemoryStore>,
}

pub fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(MemoryStore::new());
    for (id, name, role) in [(1, "root", Role::Host), (2, "carol", Role::User)] {
        store.insert_user(User {
            id,
            username: name.into(),
            nickname: name.into(),
            role,
            row_status: RowStatus::Normal,
            password_hash: Some(hash_password(PASSWORD).expect("hash")),
        });
    }
    let state = AppState::new(ApiConfig::with_secret("api-test-secret"), store.clone());
    Fixture {
        app: router(state),
        store,
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("request")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse JSON")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// `name=value` pairs from every `Set-Cookie` header, ready for a `Cookie` header.
pub fn cookies_from(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next().map(str::to_string))
        .collect()
}
