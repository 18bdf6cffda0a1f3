//! Request middleware.
//!
//! Both HTTP adapters follow the same steps: resolve the operation, run the
//! gate, attach the [`AuthContext`] and a fresh [`HeaderCarrier`] to the
//! request, then copy the carrier onto the response. Callers admitted on a
//! session cookie get it back with a renewed expiry.

pub mod connect;
pub mod gateway;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use memo_core::auth::AuthError;
use memo_core::auth::carrier::HeaderCarrier;
use memo_core::auth::cookies::is_secure_origin;
use memo_core::auth::gate::{AuthContext, Gatekeeper};
use memo_core::auth::request::Credentials;
use tracing::{debug, warn};

async fn admit(
    gate: &Gatekeeper,
    operation: Option<&str>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let credentials = Credentials::from_headers(request.headers());
    let ctx: AuthContext = gate.check(operation, &credentials).await?;
    debug!(
        operation = operation.unwrap_or("<unknown>"),
        user_id = ?ctx.user_id(),
        "request admitted"
    );

    let carrier = HeaderCarrier::new();
    let secure = is_secure_origin(request.headers());
    if let Err(e) = gate.renew_session_cookie(&ctx, &credentials, secure, &carrier) {
        warn!(error = %e, "failed to renew session cookie");
    }
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(carrier.clone());

    let mut response = next.run(request).await;
    carrier.flush_into(response.headers_mut());
    Ok(response)
}
