//! Credential codec: signed access tokens, signed refresh tokens and the
//! composite session cookie value.
//!
//! All tokens are HS256 with a `kid` header pinned to [`KEY_ID`]. Verification
//! fails closed and every failure surfaces as [`AuthError::InvalidToken`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{Identity, Role, RowStatus};

/// Current signing key version.
pub const KEY_ID: &str = "v1";

pub const ISSUER: &str = "memos";

/// Audience of short-lived stateless access tokens.
pub const ACCESS_TOKEN_AUDIENCE: &str = "user.access";

/// Audience of personal access tokens, which are also recorded in the store.
pub const PERSONAL_ACCESS_TOKEN_AUDIENCE: &str = "user.access-token";

pub const REFRESH_TOKEN_AUDIENCE: &str = "user.refresh-token";

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims of both access token variants.
///
/// Stateless tokens carry `role` and `status`; validation trusts them until
/// the token expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub jti: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RowStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Refresh token id, matched against the user's stored records.
    pub tid: String,
}

/// Claims with a numeric-user-id subject.
pub trait SubjectClaims {
    fn subject(&self) -> &str;

    fn user_id(&self) -> Result<i32, AuthError> {
        self.subject()
            .parse::<i32>()
            .map_err(|_| AuthError::MalformedSubject(self.subject().to_string()))
    }
}

impl SubjectClaims for AccessTokenClaims {
    fn subject(&self) -> &str {
        &self.sub
    }
}

impl SubjectClaims for RefreshTokenClaims {
    fn subject(&self) -> &str {
        &self.sub
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Signs and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    fn header() -> Header {
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(KEY_ID.to_string());
        header
    }

    /// Sign an access token for `identity`. `expires_at = None` issues a
    /// token without expiry (personal access tokens only).
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        audience: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let token_id = Uuid::new_v4().to_string();
        let stateless = audience == ACCESS_TOKEN_AUDIENCE;
        let claims = AccessTokenClaims {
            iss: ISSUER.to_string(),
            aud: audience.to_string(),
            sub: identity.user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.map(|t| t.timestamp()),
            jti: token_id.clone(),
            username: identity.username.clone(),
            role: stateless.then_some(identity.role),
            status: stateless.then_some(identity.row_status),
        };
        let token = encode(&Self::header(), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
        Ok(IssuedToken {
            token,
            token_id,
            issued_at: now,
            expires_at,
        })
    }

    /// Sign a refresh token carrying `token_id`.
    pub fn issue_refresh_token(
        &self,
        user_id: i32,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = RefreshTokenClaims {
            iss: ISSUER.to_string(),
            aud: REFRESH_TOKEN_AUDIENCE.to_string(),
            sub: user_id.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            tid: token_id.to_string(),
        };
        encode(&Self::header(), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Verify header, signature, issuer, audience and expiry, then decode.
    pub fn parse_and_verify<C: DeserializeOwned>(
        &self,
        raw: &str,
        audience: &str,
    ) -> Result<C, AuthError> {
        let header = jsonwebtoken::decode_header(raw).map_err(|e| {
            debug!(error = %e, "undecodable token header");
            AuthError::InvalidToken
        })?;
        if header.alg != ALGORITHM || header.kid.as_deref() != Some(KEY_ID) {
            debug!(alg = ?header.alg, kid = ?header.kid, "unexpected token algorithm or key id");
            return Err(AuthError::InvalidToken);
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["sub", "iss", "aud"]);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[audience]);

        decode::<C>(raw, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, audience, "token verification failed");
                AuthError::InvalidToken
            })
    }
}

/// Session cookie value: `{userID}-{sessionID}`.
pub fn encode_session_cookie(user_id: i32, session_id: &str) -> String {
    format!("{user_id}-{session_id}")
}

/// Split a session cookie value at the first `-`.
pub fn parse_session_cookie(value: &str) -> Result<(i32, String), AuthError> {
    let (user_id, session_id) = value.split_once('-').ok_or(AuthError::InvalidToken)?;
    let user_id = user_id
        .parse::<i32>()
        .map_err(|_| AuthError::InvalidToken)?;
    if session_id.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok((user_id, session_id.to_string()))
}

/// SHA-256 hex digest of a token, the form personal access tokens are stored in.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the signing secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memos")
        .join("jwt-secret")
}
