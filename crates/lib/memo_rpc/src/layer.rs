//! Tower layer that authorizes gRPC calls by method path.
//!
//! Sits in front of a tonic server (`Server::builder().layer(..)`). The gRPC
//! method path (`/memos.api.v1.AuthService/SignIn`) is the operation name and
//! credentials come from request metadata, which is plain HTTP/2 headers at
//! this level. Admitted calls carry an [`AuthContext`] in their extensions
//! and a renewed session cookie in their response headers when they came in
//! on one; rejected calls get a trailers-only gRPC response.

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Request, Response};
use memo_core::auth::carrier::HeaderCarrier;
use memo_core::auth::cookies::is_secure_origin;
use memo_core::auth::gate::{AuthContext, Gatekeeper};
use memo_core::auth::request::Credentials;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use crate::error::RpcError;

#[derive(Debug, Clone)]
pub struct AuthLayer {
    gate: Gatekeeper,
}

impl AuthLayer {
    pub fn new(gate: Gatekeeper) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    gate: Gatekeeper,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // Take the service that was polled ready, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        Box::pin(async move {
            let operation = request.uri().path().to_string();
            let credentials = Credentials::from_headers(request.headers());
            match gate.check(Some(&operation), &credentials).await {
                Ok(ctx) => {
                    debug!(operation = %operation, user_id = ?ctx.user_id(), "rpc admitted");
                    let renewal = HeaderCarrier::new();
                    let secure = is_secure_origin(request.headers());
                    if let Err(e) = gate.renew_session_cookie(&ctx, &credentials, secure, &renewal)
                    {
                        warn!(operation = %operation, error = %e, "failed to renew session cookie");
                    }
                    request.extensions_mut().insert::<AuthContext>(ctx);
                    let mut response = inner.call(request).await?;
                    renewal.flush_into(response.headers_mut());
                    Ok(response)
                }
                Err(e) => {
                    debug!(operation = %operation, error = %e, "rpc rejected");
                    Ok(status_response(Status::from(RpcError::from(e))))
                }
            }
        })
    }
}

/// Trailers-only gRPC response carrying `status`.
pub fn status_response<B: Default>(status: Status) -> Response<B> {
    let mut response = Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    if let Err(e) = status.add_header(headers) {
        error!(error = %e, "failed to encode grpc status headers");
        headers.insert("grpc-status", HeaderValue::from(tonic::Code::Internal as i32));
    }
    response
}
