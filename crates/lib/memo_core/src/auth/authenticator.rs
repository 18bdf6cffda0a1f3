//! Credential validation.
//!
//! Turns a raw bearer token, session cookie or refresh cookie into an
//! [`Identity`] (or a user plus refresh token id). Store failures are
//! returned as [`AuthError::Store`]; the gate decides how to surface them.

use chrono::Utc;
use tracing::{debug, error, warn};

use super::jwt::{
    ACCESS_TOKEN_AUDIENCE, AccessTokenClaims, PERSONAL_ACCESS_TOKEN_AUDIENCE,
    REFRESH_TOKEN_AUDIENCE, RefreshTokenClaims, SubjectClaims, TokenCodec, hash_token,
    parse_session_cookie,
};
use super::request::Credentials;
use super::{AuthError, AuthResult, AuthSettings};
use crate::models::auth::{CredentialKind, Identity, RowStatus, User};
use crate::store::StoreArc;

/// Validates credentials against the codec and the entity store.
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    store: StoreArc,
    settings: AuthSettings,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(codec: TokenCodec, store: StoreArc, settings: AuthSettings) -> Self {
        Self {
            codec,
            store,
            settings,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &StoreArc {
        &self.store
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Resolve the caller from whatever credentials the request carried.
    ///
    /// The session cookie is tried first, then the bearer token. When both
    /// are present and both fail, the bearer failure is returned.
    pub async fn authenticate(&self, credentials: &Credentials) -> AuthResult<Identity> {
        let mut last_error = None;

        if let Some(session) = credentials.session.as_deref() {
            match self.authenticate_by_session(session).await {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    debug!(error = %e, "session cookie rejected");
                    last_error = Some(e);
                }
            }
        }

        if let Some(token) = credentials.bearer.as_deref() {
            match self.authenticate_by_jwt(token).await {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    debug!(error = %e, "bearer token rejected");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AuthError::Unauthenticated("missing credentials".into())))
    }

    /// Resolve a single raw credential by its shape.
    ///
    /// `Bearer <jwt>` is an access token, a bare JWT is a refresh token and
    /// anything else is read as a composite session cookie.
    pub async fn authenticate_raw(&self, raw: &str) -> Option<Identity> {
        let raw = raw.trim();
        let result = if let Some(token) = strip_bearer(raw) {
            self.authenticate_by_jwt(token).await
        } else if raw.split('.').count() == 3 {
            self.authenticate_by_refresh_token(raw)
                .await
                .map(|(user, _)| Identity::from_user(&user, CredentialKind::UserLookup))
        } else {
            self.authenticate_by_session(raw).await
        };
        result
            .inspect_err(|e| debug!(error = %e, "raw credential rejected"))
            .ok()
    }

    /// Validate a bearer access token.
    ///
    /// Stateless tokens (`user.access`) are trusted on their embedded role
    /// and status. Personal access tokens (`user.access-token`) re-fetch the
    /// user and must still be listed in the store.
    pub async fn authenticate_by_jwt(&self, raw: &str) -> AuthResult<Identity> {
        if let Ok(claims) = self
            .codec
            .parse_and_verify::<AccessTokenClaims>(raw, ACCESS_TOKEN_AUDIENCE)
        {
            return identity_from_claims(&claims);
        }

        let claims = self
            .codec
            .parse_and_verify::<AccessTokenClaims>(raw, PERSONAL_ACCESS_TOKEN_AUDIENCE)?;
        let user_id = checked_subject(&claims)?;
        let user = self.active_user(user_id).await?;

        let tokens = self
            .store
            .list_access_tokens(user_id)
            .await
            .inspect_err(|e| error!(user_id, error = %e, "failed to list access tokens"))?;
        let digest = hash_token(raw);
        if !tokens.iter().any(|t| t.token_hash == digest) {
            debug!(user_id, token_id = %claims.jti, "personal access token not on record");
            return Err(AuthError::Revoked);
        }

        Ok(Identity::from_user(&user, CredentialKind::UserLookup))
    }

    /// Validate a `{userID}-{sessionID}` session cookie and slide its expiry.
    pub async fn authenticate_by_session(&self, raw: &str) -> AuthResult<Identity> {
        let (user_id, session_id) = parse_session_cookie(raw)?;
        let user = self.active_user(user_id).await?;

        let now = Utc::now();
        let sessions = self
            .store
            .list_sessions(user_id)
            .await
            .inspect_err(|e| error!(user_id, error = %e, "failed to list sessions"))?;
        let session = sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .ok_or(AuthError::Revoked)?;
        if session.last_accessed_at + self.settings.session_sliding <= now {
            debug!(user_id, session_id = %session_id, "session expired");
            return Err(AuthError::Revoked);
        }

        if let Err(e) = self.store.touch_session(user_id, &session_id, now).await {
            warn!(user_id, session_id = %session_id, error = %e, "failed to update session last access");
        }

        Ok(Identity::from_user(&user, CredentialKind::Session))
    }

    /// Validate a refresh token, returning the user and the token id.
    pub async fn authenticate_by_refresh_token(&self, raw: &str) -> AuthResult<(User, String)> {
        let claims = self
            .codec
            .parse_and_verify::<RefreshTokenClaims>(raw, REFRESH_TOKEN_AUDIENCE)?;
        let user_id = checked_subject(&claims)?;
        let user = self.active_user(user_id).await?;

        let records = self
            .store
            .list_refresh_tokens(user_id)
            .await
            .inspect_err(|e| error!(user_id, error = %e, "failed to list refresh tokens"))?;
        let record = records
            .iter()
            .find(|r| r.token_id == claims.tid)
            .ok_or_else(|| {
                debug!(user_id, token_id = %claims.tid, "refresh token not on record");
                AuthError::Revoked
            })?;
        if record.is_expired(Utc::now()) {
            debug!(user_id, token_id = %claims.tid, "refresh token record expired");
            return Err(AuthError::Revoked);
        }

        Ok((user, claims.tid))
    }

    /// Load a user that exists and is not archived.
    async fn active_user(&self, user_id: i32) -> AuthResult<User> {
        let user = self
            .store
            .get_user_by_id(user_id)
            .await
            .inspect_err(|e| error!(user_id, error = %e, "failed to load user"))?
            .ok_or_else(|| AuthError::Unauthenticated("user not found".into()))?;
        if user.is_archived() {
            debug!(user_id, "archived user presented credentials");
            return Err(AuthError::Archived);
        }
        Ok(user)
    }
}

fn strip_bearer(raw: &str) -> Option<&str> {
    let (scheme, token) = raw.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

fn checked_subject<C: SubjectClaims>(claims: &C) -> AuthResult<i32> {
    claims.user_id().inspect_err(|_| {
        warn!(subject = claims.subject(), "signed token with non-numeric subject");
    })
}

fn identity_from_claims(claims: &AccessTokenClaims) -> AuthResult<Identity> {
    let user_id = checked_subject(claims)?;
    let (Some(role), Some(row_status)) = (claims.role, claims.status) else {
        debug!(user_id, "stateless access token without role or status");
        return Err(AuthError::InvalidToken);
    };
    if row_status == RowStatus::Archived {
        return Err(AuthError::Archived);
    }
    Ok(Identity {
        user_id,
        username: claims.username.clone(),
        role,
        row_status,
        kind: CredentialKind::Claims,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration};

    use super::*;
    use crate::auth::jwt::encode_session_cookie;
    use crate::models::auth::{
        AccessTokenRecord, ClientInfo, RefreshTokenRecord, Role, SessionRecord,
    };
    use crate::store::memory::MemoryStore;
    use crate::store::{TokenStore, UserStore};

    fn user(id: i32, role: Role) -> User {
        User {
            id,
            username: format!("user{id}"),
            nickname: format!("User {id}"),
            role,
            row_status: RowStatus::Normal,
            password_hash: None,
        }
    }

    fn setup() -> (Authenticator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(user(1, Role::User));
        store.insert_user(user(2, Role::Admin));
        let auth = Authenticator::new(
            TokenCodec::new(b"test-secret"),
            store.clone(),
            AuthSettings::default(),
        );
        (auth, store)
    }

    async fn add_refresh(store: &MemoryStore, user_id: i32, tid: &str, expires: DateTime<Utc>) {
        store
            .add_refresh_token(
                user_id,
                RefreshTokenRecord {
                    token_id: tid.into(),
                    expires_at: expires,
                    created_at: Utc::now(),
                    client_info: ClientInfo::default(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stateless_token_trusts_embedded_claims() {
        let (auth, store) = setup();
        let identity = Identity::from_user(&user(1, Role::User), CredentialKind::Claims);
        let token = auth
            .codec()
            .issue_access_token(&identity, ACCESS_TOKEN_AUDIENCE, Some(Utc::now() + Duration::minutes(5)))
            .unwrap()
            .token;

        // Archival after issuance is not visible until the token expires.
        store.update_user(1, |u| u.row_status = RowStatus::Archived);
        let resolved = auth.authenticate_by_jwt(&token).await.unwrap();
        assert_eq!(resolved.user_id, 1);
        assert_eq!(resolved.kind, CredentialKind::Claims);
    }

    #[tokio::test]
    async fn personal_token_requires_store_record() {
        let (auth, store) = setup();
        let identity = Identity::from_user(&user(1, Role::User), CredentialKind::UserLookup);
        let issued = auth
            .codec()
            .issue_access_token(&identity, PERSONAL_ACCESS_TOKEN_AUDIENCE, None)
            .unwrap();

        let err = auth.authenticate_by_jwt(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::Revoked));

        store
            .add_access_token(
                1,
                AccessTokenRecord {
                    token_id: issued.token_id.clone(),
                    token_hash: hash_token(&issued.token),
                    description: "cli".into(),
                    issued_at: issued.issued_at,
                    expires_at: None,
                },
            )
            .await
            .unwrap();
        let resolved = auth.authenticate_by_jwt(&issued.token).await.unwrap();
        assert_eq!(resolved.kind, CredentialKind::UserLookup);
    }

    #[tokio::test]
    async fn personal_token_of_archived_user_is_rejected() {
        let (auth, store) = setup();
        let identity = Identity::from_user(&user(1, Role::User), CredentialKind::UserLookup);
        let issued = auth
            .codec()
            .issue_access_token(&identity, PERSONAL_ACCESS_TOKEN_AUDIENCE, None)
            .unwrap();
        store
            .add_access_token(
                1,
                AccessTokenRecord {
                    token_id: issued.token_id,
                    token_hash: hash_token(&issued.token),
                    description: String::new(),
                    issued_at: issued.issued_at,
                    expires_at: None,
                },
            )
            .await
            .unwrap();
        store.update_user(1, |u| u.row_status = RowStatus::Archived);

        let err = auth.authenticate_by_jwt(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::Archived));
    }

    #[tokio::test]
    async fn refresh_token_must_be_on_record_and_unexpired() {
        let (auth, store) = setup();
        let expires = Utc::now() + Duration::days(1);
        let token = auth.codec().issue_refresh_token(1, "tid-1", expires).unwrap();

        assert!(matches!(
            auth.authenticate_by_refresh_token(&token).await,
            Err(AuthError::Revoked)
        ));

        add_refresh(&store, 1, "tid-1", expires).await;
        let (user, tid) = auth.authenticate_by_refresh_token(&token).await.unwrap();
        assert_eq!((user.id, tid.as_str()), (1, "tid-1"));

        store.remove_refresh_token(1, "tid-1").await.unwrap();
        add_refresh(&store, 1, "tid-1", Utc::now() - Duration::seconds(1)).await;
        assert!(matches!(
            auth.authenticate_by_refresh_token(&token).await,
            Err(AuthError::Revoked)
        ));
    }

    #[tokio::test]
    async fn session_slides_on_use_and_expires_when_idle() {
        let (auth, store) = setup();
        let stale = Utc::now() - Duration::days(3);
        store
            .add_session(
                2,
                SessionRecord {
                    session_id: "fresh".into(),
                    created_at: stale,
                    last_accessed_at: stale,
                    client_info: None,
                },
            )
            .await
            .unwrap();
        let idle = Utc::now() - Duration::days(15);
        store
            .add_session(
                2,
                SessionRecord {
                    session_id: "idle".into(),
                    created_at: idle,
                    last_accessed_at: idle,
                    client_info: None,
                },
            )
            .await
            .unwrap();

        let identity = auth
            .authenticate_by_session(&encode_session_cookie(2, "fresh"))
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.kind, CredentialKind::Session);
        let sessions = store.list_sessions(2).await.unwrap();
        assert!(sessions[0].last_accessed_at > stale);

        assert!(matches!(
            auth.authenticate_by_session(&encode_session_cookie(2, "idle")).await,
            Err(AuthError::Revoked)
        ));
        assert!(matches!(
            auth.authenticate_by_session(&encode_session_cookie(2, "missing")).await,
            Err(AuthError::Revoked)
        ));
    }

    #[tokio::test]
    async fn session_cookie_wins_over_bearer() {
        let (auth, store) = setup();
        let now = Utc::now();
        store
            .add_session(
                2,
                SessionRecord {
                    session_id: "s".into(),
                    created_at: now,
                    last_accessed_at: now,
                    client_info: None,
                },
            )
            .await
            .unwrap();
        let bearer = auth
            .codec()
            .issue_access_token(
                &Identity::from_user(&user(1, Role::User), CredentialKind::Claims),
                ACCESS_TOKEN_AUDIENCE,
                Some(now + Duration::minutes(5)),
            )
            .unwrap()
            .token;

        let credentials = Credentials {
            session: Some(encode_session_cookie(2, "s")),
            bearer: Some(bearer.clone()),
            refresh: None,
        };
        assert_eq!(auth.authenticate(&credentials).await.unwrap().user_id, 2);

        let credentials = Credentials {
            session: Some(encode_session_cookie(2, "gone")),
            bearer: Some(bearer),
            refresh: None,
        };
        assert_eq!(auth.authenticate(&credentials).await.unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn raw_credentials_dispatch_by_shape() {
        let (auth, store) = setup();
        let expires = Utc::now() + Duration::days(1);
        add_refresh(&store, 2, "tid-2", expires).await;
        let refresh = auth.codec().issue_refresh_token(2, "tid-2", expires).unwrap();
        assert_eq!(auth.authenticate_raw(&refresh).await.map(|i| i.user_id), Some(2));

        let access = auth
            .codec()
            .issue_access_token(
                &Identity::from_user(&user(1, Role::User), CredentialKind::Claims),
                ACCESS_TOKEN_AUDIENCE,
                Some(expires),
            )
            .unwrap()
            .token;
        assert_eq!(
            auth.authenticate_raw(&format!("Bearer {access}"))
                .await
                .map(|i| i.user_id),
            Some(1)
        );
        assert_eq!(auth.authenticate_raw("9-nothing").await, None);
        assert!(store.get_user_by_id(9).await.unwrap().is_none());
    }
}
