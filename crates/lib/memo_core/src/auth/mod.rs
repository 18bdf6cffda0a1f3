//! Authentication and authorization core.
//!
//! Credential codec, authenticator, authorization policy, header carrier and
//! the protocol-neutral auth operations shared by every transport adapter.

pub mod authenticator;
pub mod carrier;
pub mod client_info;
pub mod cookies;
pub mod gate;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod request;
pub mod service;

use chrono::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
///
/// Transports never branch on the variant directly; they map
/// [`AuthError::kind`] so that malformed, expired and revoked credentials
/// collapse into the same signal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    /// Bad signature, unknown key id or algorithm, expired, or undecodable.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Signature was valid but the subject is not a user id.
    #[error("Malformed subject claim: {0}")]
    MalformedSubject(String),

    #[error("Token revoked or unknown")]
    Revoked,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Account archived")]
    Archived,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transport-independent error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::CredentialError
            | AuthError::InvalidToken
            | AuthError::MalformedSubject(_)
            | AuthError::Revoked
            | AuthError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AuthError::Archived | AuthError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AuthError::ValidationError(_) => ErrorKind::InvalidArgument,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::TokenError(_) | AuthError::Store(_) | AuthError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message safe to return to a client.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::CredentialError => "invalid username or password".into(),
            AuthError::Unauthenticated(m) => m.clone(),
            AuthError::InvalidToken | AuthError::MalformedSubject(_) | AuthError::Revoked => {
                "invalid or expired credentials".into()
            }
            AuthError::Archived => "user account is archived".into(),
            AuthError::PermissionDenied(m)
            | AuthError::ValidationError(m)
            | AuthError::NotFound(m) => m.clone(),
            AuthError::TokenError(_) | AuthError::Store(_) | AuthError::Internal(_) => {
                "internal error".into()
            }
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 30 days, renewed on every rotation.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Session lifetime after the last access: 14 days.
pub const SESSION_SLIDING_DAYS: i64 = 14;

/// Credential lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub session_sliding: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
            session_sliding: Duration::days(SESSION_SLIDING_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_share_one_kind_and_message() {
        let errors = [
            AuthError::InvalidToken,
            AuthError::MalformedSubject("abc".into()),
            AuthError::Revoked,
        ];
        for e in &errors {
            assert_eq!(e.kind(), ErrorKind::Unauthenticated);
            assert_eq!(e.public_message(), "invalid or expired credentials");
        }
    }

    #[test]
    fn archived_is_permission_denied() {
        assert_eq!(AuthError::Archived.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn store_failures_do_not_leak_details() {
        let e = AuthError::Store(StoreError::Backend("connection refused".into()));
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert_eq!(e.public_message(), "internal error");
    }
}
