//! # memo_api
//!
//! HTTP adapters for the memo auth core: Connect (`/memos.api.v1.*`) and the
//! REST gateway (`/api/v1/*`).

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use memo_core::auth::authenticator::Authenticator;
use memo_core::auth::gate::Gatekeeper;
use memo_core::auth::jwt::TokenCodec;
use memo_core::auth::policy::ops;
use memo_core::auth::service::AuthService;
use memo_core::store::StoreArc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::error::{AppError, ConnectError};
use crate::handlers::auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: AuthService,
    pub gate: Gatekeeper,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the auth core over `store` using the secret and lifetimes in `config`.
    pub fn new(config: ApiConfig, store: StoreArc) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            TokenCodec::new(config.jwt_secret.as_bytes()),
            store,
            config.auth,
        ));
        Self {
            service: AuthService::new(authenticator.clone()),
            gate: Gatekeeper::new(authenticator),
            config,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Connect: the path is the operation name. Methods this server does not
    // implement still pass through the gate before answering `unimplemented`.
    let connect = Router::new()
        .route(ops::SIGN_IN, post(auth::sign_in::<ConnectError>))
        .route(ops::SIGN_OUT, post(auth::sign_out::<ConnectError>))
        .route(ops::REFRESH_TOKEN, post(auth::refresh_token::<ConnectError>))
        .route(ops::GET_CURRENT_USER, post(auth::get_current_user::<ConnectError>))
        .route(ops::LIST_USER_SESSIONS, post(auth::list_sessions::<ConnectError>))
        .route(ops::REVOKE_USER_SESSION, post(auth::revoke_session::<ConnectError>))
        .route(
            ops::LIST_PERSONAL_ACCESS_TOKENS,
            post(auth::list_access_tokens::<ConnectError>),
        )
        .route(
            ops::CREATE_PERSONAL_ACCESS_TOKEN,
            post(auth::create_access_token::<ConnectError>),
        )
        .route(
            ops::DELETE_PERSONAL_ACCESS_TOKEN,
            post(auth::delete_access_token::<ConnectError>),
        )
        .route("/{service}/{method}", post(handlers::unimplemented))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::connect::authorize,
        ));

    // REST gateway. Unknown paths fall through to a 404 behind the same gate.
    let rest = Router::new()
        .route("/api/v1/auth/signin", post(auth::sign_in::<AppError>))
        .route("/api/v1/auth/signout", post(auth::sign_out::<AppError>))
        .route("/api/v1/auth/refresh", post(auth::refresh_token::<AppError>))
        .route("/api/v1/auth/me", get(auth::get_current_user::<AppError>))
        .route("/api/v1/auth/sessions", get(auth::list_sessions::<AppError>))
        .route(
            "/api/v1/auth/sessions/{id}",
            delete(auth::revoke_session_by_path::<AppError>),
        )
        .route(
            "/api/v1/auth/access-tokens",
            get(auth::list_access_tokens::<AppError>)
                .post(auth::create_access_token::<AppError>),
        )
        .route(
            "/api/v1/auth/access-tokens/{id}",
            delete(auth::delete_access_token_by_path::<AppError>),
        )
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gateway::authorize,
        ));

    Router::new()
        .merge(connect)
        .merge(rest)
        .layer(cors)
        .with_state(state)
}
