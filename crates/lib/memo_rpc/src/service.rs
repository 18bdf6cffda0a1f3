//! gRPC entry points for the auth service.
//!
//! Each method unpacks a `tonic::Request`, runs the shared [`AuthService`]
//! operation and packs the result into a `tonic::Response`. Cookies set by
//! the operation travel back as response metadata, unless the request already
//! carries a [`HeaderCarrier`] from an outer adapter.

use memo_core::auth::carrier::{HeaderCarrier, HeaderSink};
use memo_core::auth::gate::AuthContext;
use memo_core::auth::request::RequestMeta;
use memo_core::auth::service::AuthService;
use memo_core::models::auth::Identity;
use memo_core::models::wire::{
    CreateAccessTokenRequest, CreateAccessTokenResponse, DeleteAccessTokenRequest, Empty,
    GetCurrentUserResponse, ListAccessTokensResponse, ListSessionsResponse,
    RefreshTokenResponse, RevokeSessionRequest, SignInRequest, SignInResponse,
};
use tonic::{Request, Response, Status};

use crate::error::RpcError;
use crate::metadata::MetadataSink;

#[derive(Debug, Clone)]
pub struct AuthServiceRpc {
    service: AuthService,
}

impl AuthServiceRpc {
    pub fn new(service: AuthService) -> Self {
        Self { service }
    }

    pub async fn sign_in(
        &self,
        request: Request<SignInRequest>,
    ) -> Result<Response<SignInResponse>, Status> {
        let meta = request_meta(&request);
        let carrier = request.extensions().get::<HeaderCarrier>().cloned();
        let sink = MetadataSink::new();
        let body = self
            .service
            .sign_in(request.into_inner(), &meta, sink_for(&carrier, &sink))
            .await
            .map_err(RpcError::from)?;
        Ok(respond(body, sink))
    }

    pub async fn sign_out(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let meta = request_meta(&request);
        let carrier = request.extensions().get::<HeaderCarrier>().cloned();
        let sink = MetadataSink::new();
        let body = self
            .service
            .sign_out(&meta, sink_for(&carrier, &sink))
            .await
            .map_err(RpcError::from)?;
        Ok(respond(body, sink))
    }

    pub async fn refresh_token(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<RefreshTokenResponse>, Status> {
        let meta = request_meta(&request);
        let carrier = request.extensions().get::<HeaderCarrier>().cloned();
        let sink = MetadataSink::new();
        let body = self
            .service
            .refresh_token(&meta, sink_for(&carrier, &sink))
            .await
            .map_err(RpcError::from)?;
        Ok(respond(body, sink))
    }

    pub async fn get_current_user(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<GetCurrentUserResponse>, Status> {
        let identity = identity(&request);
        let body = self
            .service
            .get_current_user(identity.as_ref())
            .await
            .map_err(RpcError::from)?;
        Ok(Response::new(body))
    }

    pub async fn list_user_sessions(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<ListSessionsResponse>, Status> {
        let identity = identity(&request);
        Ok(Response::new(
            self.service
                .list_sessions(identity.as_ref())
                .await
                .map_err(RpcError::from)?,
        ))
    }

    pub async fn revoke_user_session(
        &self,
        request: Request<RevokeSessionRequest>,
    ) -> Result<Response<Empty>, Status> {
        let identity = identity(&request);
        let req = request.into_inner();
        Ok(Response::new(
            self.service
                .revoke_session(identity.as_ref(), &req.session_id)
                .await
                .map_err(RpcError::from)?,
        ))
    }

    pub async fn create_personal_access_token(
        &self,
        request: Request<CreateAccessTokenRequest>,
    ) -> Result<Response<CreateAccessTokenResponse>, Status> {
        let identity = identity(&request);
        let body = self
            .service
            .create_access_token(identity.as_ref(), request.into_inner())
            .await
            .map_err(RpcError::from)?;
        Ok(Response::new(body))
    }

    pub async fn list_personal_access_tokens(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<ListAccessTokensResponse>, Status> {
        let identity = identity(&request);
        Ok(Response::new(
            self.service
                .list_access_tokens(identity.as_ref())
                .await
                .map_err(RpcError::from)?,
        ))
    }

    pub async fn delete_personal_access_token(
        &self,
        request: Request<DeleteAccessTokenRequest>,
    ) -> Result<Response<Empty>, Status> {
        let identity = identity(&request);
        let req = request.into_inner();
        Ok(Response::new(
            self.service
                .revoke_access_token(identity.as_ref(), &req.token_id)
                .await
                .map_err(RpcError::from)?,
        ))
    }
}

fn request_meta<T>(request: &Request<T>) -> RequestMeta {
    RequestMeta::from_headers(&request.metadata().clone().into_headers())
}

/// Caller identity attached by the auth layer, if any.
fn identity<T>(request: &Request<T>) -> Option<Identity> {
    request
        .extensions()
        .get::<AuthContext>()
        .and_then(|ctx| ctx.identity.clone())
}

/// Cookies go to the carrier when an outer adapter installed one, else
/// straight into response metadata.
fn sink_for<'a>(
    carrier: &'a Option<HeaderCarrier>,
    sink: &'a MetadataSink,
) -> &'a dyn HeaderSink {
    match carrier {
        Some(carrier) => carrier,
        None => sink,
    }
}

fn respond<T>(body: T, sink: MetadataSink) -> Response<T> {
    let mut response = Response::new(body);
    sink.apply(&mut response);
    response
}
