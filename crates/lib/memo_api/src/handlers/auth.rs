//! Auth request handlers.
//!
//! Every handler is generic over its error type so the same body is mounted
//! twice: with [`ConnectError`](crate::error::ConnectError) on the Connect
//! routes and [`AppError`](crate::error::AppError) on the REST routes.
//! Cookies go through the [`HeaderCarrier`] the middleware attached.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use memo_core::auth::AuthError;
use memo_core::auth::carrier::HeaderCarrier;
use memo_core::auth::gate::AuthContext;
use memo_core::auth::request::RequestMeta;
use memo_core::models::wire::{
    CreateAccessTokenRequest, CreateAccessTokenResponse, DeleteAccessTokenRequest, Empty,
    GetCurrentUserResponse, ListAccessTokensResponse, ListSessionsResponse, RefreshTokenResponse,
    RevokeSessionRequest, SignInRequest, SignInResponse,
};

use crate::AppState;

/// `SignIn`: verify username and password, set the refresh cookie.
pub async fn sign_in<E>(
    State(state): State<AppState>,
    Extension(carrier): Extension<HeaderCarrier>,
    headers: HeaderMap,
    Json(body): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let meta = RequestMeta::from_headers(&headers);
    let resp = state.service.sign_in(body, &meta, &carrier).await?;
    Ok(Json(resp))
}

/// `SignOut`: revoke the presented refresh token and session, clear cookies.
pub async fn sign_out<E>(
    State(state): State<AppState>,
    Extension(carrier): Extension<HeaderCarrier>,
    headers: HeaderMap,
) -> Result<Json<Empty>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let meta = RequestMeta::from_headers(&headers);
    let resp = state.service.sign_out(&meta, &carrier).await?;
    Ok(Json(resp))
}

/// `RefreshToken`: rotate the refresh cookie, return a new access token.
pub async fn refresh_token<E>(
    State(state): State<AppState>,
    Extension(carrier): Extension<HeaderCarrier>,
    headers: HeaderMap,
) -> Result<Json<RefreshTokenResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let meta = RequestMeta::from_headers(&headers);
    let resp = state.service.refresh_token(&meta, &carrier).await?;
    Ok(Json(resp))
}

/// `GetCurrentUser`.
pub async fn get_current_user<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<GetCurrentUserResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state.service.get_current_user(ctx.identity.as_ref()).await?;
    Ok(Json(resp))
}

pub async fn list_sessions<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ListSessionsResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state.service.list_sessions(ctx.identity.as_ref()).await?;
    Ok(Json(resp))
}

/// Connect form: session id in the body.
pub async fn revoke_session<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<RevokeSessionRequest>,
) -> Result<Json<Empty>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .revoke_session(ctx.identity.as_ref(), &body.session_id)
        .await?;
    Ok(Json(resp))
}

/// REST form: `DELETE /api/v1/auth/sessions/{id}`.
pub async fn revoke_session_by_path<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<String>,
) -> Result<Json<Empty>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .revoke_session(ctx.identity.as_ref(), &session_id)
        .await?;
    Ok(Json(resp))
}

pub async fn list_access_tokens<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ListAccessTokensResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .list_access_tokens(ctx.identity.as_ref())
        .await?;
    Ok(Json(resp))
}

/// Create a personal access token. The token is only returned here.
pub async fn create_access_token<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateAccessTokenRequest>,
) -> Result<Json<CreateAccessTokenResponse>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .create_access_token(ctx.identity.as_ref(), body)
        .await?;
    Ok(Json(resp))
}

pub async fn delete_access_token<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<DeleteAccessTokenRequest>,
) -> Result<Json<Empty>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .revoke_access_token(ctx.identity.as_ref(), &body.token_id)
        .await?;
    Ok(Json(resp))
}

pub async fn delete_access_token_by_path<E>(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(token_id): Path<String>,
) -> Result<Json<Empty>, E>
where
    E: From<AuthError> + IntoResponse,
{
    let resp = state
        .service
        .revoke_access_token(ctx.identity.as_ref(), &token_id)
        .await?;
    Ok(Json(resp))
}
