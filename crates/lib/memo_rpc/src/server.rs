//! tonic services for the auth surface.
//!
//! [`AuthServiceServer`] and [`UserServiceServer`] route gRPC method paths to
//! [`AuthServiceRpc`] and frame messages with [`JsonCodec`]. Mount both on a
//! `tonic::transport::Server` behind [`crate::AuthLayer`].

use std::convert::Infallible;
use std::task::{Context, Poll};

use http::header::{CONTENT_TYPE, HeaderValue};
use memo_core::auth::policy::ops;
use memo_core::models::wire::{
    CreateAccessTokenRequest, CreateAccessTokenResponse, DeleteAccessTokenRequest, Empty,
    GetCurrentUserResponse, ListAccessTokensResponse, ListSessionsResponse, RefreshTokenResponse,
    RevokeSessionRequest, SignInRequest, SignInResponse,
};
use tonic::body::{BoxBody, empty_body};
use tonic::codegen::{Body, BoxFuture, StdError};
use tonic::server::{Grpc, NamedService};
use tower::Service;
use tracing::debug;

use crate::codec::JsonCodec;
use crate::service::AuthServiceRpc;

pub const AUTH_SERVICE_NAME: &str = "memos.api.v1.AuthService";
pub const USER_SERVICE_NAME: &str = "memos.api.v1.UserService";

/// `memos.api.v1.AuthService`: sign-in, sign-out, refresh, current user.
#[derive(Debug, Clone)]
pub struct AuthServiceServer {
    rpc: AuthServiceRpc,
}

impl AuthServiceServer {
    pub fn new(rpc: AuthServiceRpc) -> Self {
        Self { rpc }
    }
}

impl NamedService for AuthServiceServer {
    const NAME: &'static str = AUTH_SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for AuthServiceServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        dispatch(self.rpc.clone(), request)
    }
}

/// `memos.api.v1.UserService`: the session and personal access token methods.
#[derive(Debug, Clone)]
pub struct UserServiceServer {
    rpc: AuthServiceRpc,
}

impl UserServiceServer {
    pub fn new(rpc: AuthServiceRpc) -> Self {
        Self { rpc }
    }
}

impl NamedService for UserServiceServer {
    const NAME: &'static str = USER_SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for UserServiceServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        dispatch(self.rpc.clone(), request)
    }
}

/// Run the unary method named by the request path.
fn dispatch<B>(
    rpc: AuthServiceRpc,
    request: http::Request<B>,
) -> BoxFuture<http::Response<BoxBody>, Infallible>
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    macro_rules! unary {
        ($method:ident, $req:ty, $resp:ty) => {
            Box::pin(async move {
                let method = tower::service_fn(move |message: tonic::Request<$req>| {
                    let rpc = rpc.clone();
                    async move { rpc.$method(message).await }
                });
                let mut grpc = Grpc::new(JsonCodec::<$resp, $req>::default());
                Ok::<_, Infallible>(grpc.unary(method, request).await)
            })
        };
    }

    let path = request.uri().path().to_string();
    match path.as_str() {
        ops::SIGN_IN => unary!(sign_in, SignInRequest, SignInResponse),
        ops::SIGN_OUT => unary!(sign_out, Empty, Empty),
        ops::REFRESH_TOKEN => unary!(refresh_token, Empty, RefreshTokenResponse),
        ops::GET_CURRENT_USER => unary!(get_current_user, Empty, GetCurrentUserResponse),
        ops::LIST_USER_SESSIONS => unary!(list_user_sessions, Empty, ListSessionsResponse),
        ops::REVOKE_USER_SESSION => unary!(revoke_user_session, RevokeSessionRequest, Empty),
        ops::CREATE_PERSONAL_ACCESS_TOKEN => unary!(
            create_personal_access_token,
            CreateAccessTokenRequest,
            CreateAccessTokenResponse
        ),
        ops::LIST_PERSONAL_ACCESS_TOKENS => {
            unary!(list_personal_access_tokens, Empty, ListAccessTokensResponse)
        }
        ops::DELETE_PERSONAL_ACCESS_TOKEN => {
            unary!(delete_personal_access_token, DeleteAccessTokenRequest, Empty)
        }
        _ => {
            debug!(path = %path, "grpc method not implemented");
            Box::pin(async move { Ok::<_, Infallible>(unimplemented()) })
        }
    }
}

fn unimplemented() -> http::Response<BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert(
        "grpc-status",
        HeaderValue::from(tonic::Code::Unimplemented as i32),
    );
    response
}
