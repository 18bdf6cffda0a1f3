//! Protocol-neutral authorization gate.
//!
//! Every adapter resolves the operation name and the request credentials,
//! then calls [`Gatekeeper::check`]. The decision is the same no matter which
//! transport the request arrived on.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use super::authenticator::Authenticator;
use super::carrier::HeaderSink;
use super::cookies::{session_cookie, set_cookie};
use super::policy::{Access, access_for};
use super::request::Credentials;
use super::{AuthError, AuthResult};
use crate::models::auth::{CredentialKind, Identity};

/// Authentication outcome attached to an admitted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// `None` for anonymous callers of public operations.
    pub identity: Option<Identity>,
}

impl AuthContext {
    pub fn user_id(&self) -> Option<i32> {
        self.identity.as_ref().map(|i| i.user_id)
    }
}

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    authenticator: Arc<Authenticator>,
}

impl Gatekeeper {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    /// Admit or reject a call to `operation`.
    ///
    /// `operation = None` means the adapter could not map the request to a
    /// known operation; such calls need an authenticated caller.
    pub async fn check(
        &self,
        operation: Option<&str>,
        credentials: &Credentials,
    ) -> AuthResult<AuthContext> {
        let access = access_for(operation);
        let op = operation.unwrap_or("<unknown>");

        match self.authenticator.authenticate(credentials).await {
            Ok(identity) => {
                if access == Access::Admin && !identity.is_admin() {
                    debug!(operation = op, user_id = identity.user_id, "admin operation denied");
                    return Err(AuthError::PermissionDenied(
                        "admin role required".into(),
                    ));
                }
                Ok(AuthContext {
                    identity: Some(identity),
                })
            }
            Err(_) if access == Access::Public => Ok(AuthContext::default()),
            Err(AuthError::Archived) => Err(AuthError::Archived),
            Err(AuthError::Store(e)) => {
                error!(operation = op, error = %e, "store failure during authentication");
                Err(AuthError::Unauthenticated("authentication failed".into()))
            }
            Err(e) if credentials.is_empty() => {
                debug!(operation = op, error = %e, "no credentials");
                Err(AuthError::Unauthenticated("authentication required".into()))
            }
            Err(e) => {
                debug!(operation = op, error = %e, "credentials rejected");
                Err(e)
            }
        }
    }

    /// Re-send the session cookie with its expiry moved to now plus the
    /// sliding window, so the browser keeps it as long as the server does.
    /// Does nothing unless the caller was admitted on a session cookie.
    pub fn renew_session_cookie(
        &self,
        ctx: &AuthContext,
        credentials: &Credentials,
        secure: bool,
        sink: &dyn HeaderSink,
    ) -> AuthResult<()> {
        let on_session = ctx
            .identity
            .as_ref()
            .is_some_and(|identity| identity.kind == CredentialKind::Session);
        let Some(raw) = credentials.session.as_deref().filter(|_| on_session) else {
            return Ok(());
        };
        let expires_at = Utc::now() + self.authenticator.settings().session_sliding;
        set_cookie(sink, &session_cookie(raw, expires_at, secure)?)
    }
}
