//! Auth operations shared by every transport.
//!
//! Each operation takes the caller's [`RequestMeta`] and writes cookies
//! through a [`HeaderSink`], so one body serves Connect, REST and native gRPC.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::authenticator::Authenticator;
use super::carrier::HeaderSink;
use super::cookies::{
    REFRESH_COOKIE, SESSION_COOKIE, clear_cookie, refresh_cookie, session_cookie, set_cookie,
};
use super::jwt::{
    ACCESS_TOKEN_AUDIENCE, IssuedToken, PERSONAL_ACCESS_TOKEN_AUDIENCE, REFRESH_TOKEN_AUDIENCE,
    RefreshTokenClaims, SubjectClaims, encode_session_cookie, hash_token, parse_session_cookie,
};
use super::password::verify_password;
use super::request::RequestMeta;
use super::{AuthError, AuthResult};
use crate::models::auth::{
    AccessTokenRecord, CredentialKind, Identity, RefreshTokenRecord, SessionRecord, User,
};
use crate::models::wire::{
    AccessTokenView, CreateAccessTokenRequest, CreateAccessTokenResponse, Empty,
    GetCurrentUserResponse, ListAccessTokensResponse, ListSessionsResponse, RefreshTokenResponse,
    SignInRequest, SignInResponse, UserView,
};

/// Protocol-neutral auth service.
#[derive(Debug, Clone)]
pub struct AuthService {
    authenticator: Arc<Authenticator>,
}

impl AuthService {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    /// Verify a username and password, then issue a refresh cookie, an
    /// access token and optionally a session cookie.
    pub async fn sign_in(
        &self,
        req: SignInRequest,
        meta: &RequestMeta,
        sink: &dyn HeaderSink,
    ) -> AuthResult<SignInResponse> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(AuthError::ValidationError(
                "username and password are required".into(),
            ));
        }

        let store = self.authenticator.store();
        let user = store
            .get_user_by_username(req.username.trim())
            .await?
            .ok_or(AuthError::CredentialError)?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::CredentialError)?;
        if !verify_password(&req.password, hash)? {
            debug!(user_id = user.id, "password mismatch");
            return Err(AuthError::CredentialError);
        }
        if user.is_archived() {
            return Err(AuthError::Archived);
        }

        self.issue_refresh(&user, meta, sink).await?;
        if req.session {
            self.open_session(&user, meta, sink).await?;
        }
        let access = self.issue_access(&user)?;

        info!(user_id = user.id, session = req.session, "user signed in");
        Ok(SignInResponse {
            user: UserView::from(&user),
            access_token: access.token,
            access_token_expires_at: access
                .expires_at
                .ok_or_else(|| AuthError::Internal("access token without expiry".into()))?,
        })
    }

    /// Drop whatever refresh token and session the request carries and clear
    /// both cookies. Always succeeds.
    pub async fn sign_out(&self, meta: &RequestMeta, sink: &dyn HeaderSink) -> AuthResult<Empty> {
        let store = self.authenticator.store();

        if let Some(raw) = meta.credentials.refresh.as_deref() {
            match self
                .authenticator
                .codec()
                .parse_and_verify::<RefreshTokenClaims>(raw, REFRESH_TOKEN_AUDIENCE)
                .and_then(|claims| Ok((claims.user_id()?, claims.tid)))
            {
                Ok((user_id, tid)) => {
                    if let Err(e) = store.remove_refresh_token(user_id, &tid).await {
                        warn!(user_id, token_id = %tid, error = %e, "failed to remove refresh token on sign-out");
                    }
                }
                Err(e) => debug!(error = %e, "ignoring unreadable refresh cookie on sign-out"),
            }
        }

        if let Some(raw) = meta.credentials.session.as_deref() {
            match parse_session_cookie(raw) {
                Ok((user_id, session_id)) => {
                    if let Err(e) = store.remove_session(user_id, &session_id).await {
                        warn!(user_id, session_id = %session_id, error = %e, "failed to remove session on sign-out");
                    }
                }
                Err(e) => debug!(error = %e, "ignoring unreadable session cookie on sign-out"),
            }
        }

        set_cookie(sink, &clear_cookie(REFRESH_COOKIE, meta.secure))?;
        set_cookie(sink, &clear_cookie(SESSION_COOKIE, meta.secure))?;
        Ok(Empty {})
    }

    /// Rotate the refresh token and issue a new access token.
    ///
    /// The new record is stored before the old one is removed, so a crash or
    /// a concurrent rotation leaves the user with an extra valid token rather
    /// than none.
    pub async fn refresh_token(
        &self,
        meta: &RequestMeta,
        sink: &dyn HeaderSink,
    ) -> AuthResult<RefreshTokenResponse> {
        let raw = meta
            .credentials
            .refresh
            .as_deref()
            .ok_or_else(|| AuthError::Unauthenticated("refresh token not found".into()))?;
        let (user, old_token_id) = self.authenticator.authenticate_by_refresh_token(raw).await?;

        self.issue_refresh(&user, meta, sink).await?;
        if let Err(e) = self
            .authenticator
            .store()
            .remove_refresh_token(user.id, &old_token_id)
            .await
        {
            warn!(user_id = user.id, token_id = %old_token_id, error = %e, "failed to remove rotated refresh token");
        }

        let access = self.issue_access(&user)?;
        debug!(user_id = user.id, "refresh token rotated");
        Ok(RefreshTokenResponse {
            access_token: access.token,
            expires_at: access
                .expires_at
                .ok_or_else(|| AuthError::Internal("access token without expiry".into()))?,
        })
    }

    /// The caller's own user record.
    pub async fn get_current_user(
        &self,
        identity: Option<&Identity>,
    ) -> AuthResult<GetCurrentUserResponse> {
        let identity = require(identity)?;
        let user = self
            .authenticator
            .store()
            .get_user_by_id(identity.user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated("user not found".into()))?;
        Ok(GetCurrentUserResponse {
            user: UserView::from(&user),
        })
    }

    /// Unexpired refresh tokens of a user. Expired records found on the way
    /// are deleted.
    pub async fn list_refresh_tokens(&self, user_id: i32) -> AuthResult<Vec<RefreshTokenRecord>> {
        let store = self.authenticator.store();
        let now = Utc::now();
        let (live, expired): (Vec<_>, Vec<_>) = store
            .list_refresh_tokens(user_id)
            .await?
            .into_iter()
            .partition(|r| !r.is_expired(now));
        for record in expired {
            if let Err(e) = store.remove_refresh_token(user_id, &record.token_id).await {
                warn!(user_id, token_id = %record.token_id, error = %e, "failed to clean up expired refresh token");
            }
        }
        Ok(live)
    }

    pub async fn list_sessions(
        &self,
        identity: Option<&Identity>,
    ) -> AuthResult<ListSessionsResponse> {
        let identity = require(identity)?;
        let sessions = self.live_sessions(identity.user_id).await?;
        Ok(ListSessionsResponse { sessions })
    }

    /// Sessions of a user still inside the sliding window. Idle sessions
    /// found on the way are deleted.
    async fn live_sessions(&self, user_id: i32) -> AuthResult<Vec<SessionRecord>> {
        let store = self.authenticator.store();
        let cutoff = Utc::now().checked_sub_signed(self.authenticator.settings().session_sliding);
        let (live, idle): (Vec<_>, Vec<_>) = store
            .list_sessions(user_id)
            .await?
            .into_iter()
            .partition(|s| cutoff.is_none_or(|cutoff| s.last_accessed_at > cutoff));
        for session in idle {
            if let Err(e) = store.remove_session(user_id, &session.session_id).await {
                warn!(user_id, session_id = %session.session_id, error = %e, "failed to clean up idle session");
            }
        }
        Ok(live)
    }

    /// Drop expired refresh tokens and idle sessions of a user.
    async fn prune_stale_credentials(&self, user_id: i32) {
        if let Err(e) = self.list_refresh_tokens(user_id).await {
            warn!(user_id, error = %e, "refresh token cleanup failed");
        }
        if let Err(e) = self.live_sessions(user_id).await {
            warn!(user_id, error = %e, "session cleanup failed");
        }
    }

    pub async fn revoke_session(
        &self,
        identity: Option<&Identity>,
        session_id: &str,
    ) -> AuthResult<Empty> {
        let identity = require(identity)?;
        let store = self.authenticator.store();
        let sessions = store.list_sessions(identity.user_id).await?;
        if !sessions.iter().any(|s| s.session_id == session_id) {
            return Err(AuthError::NotFound(format!("session {session_id} not found")));
        }
        store.remove_session(identity.user_id, session_id).await?;
        info!(user_id = identity.user_id, session_id, "session revoked");
        Ok(Empty {})
    }

    /// Issue a personal access token and record it.
    pub async fn create_access_token(
        &self,
        identity: Option<&Identity>,
        req: CreateAccessTokenRequest,
    ) -> AuthResult<CreateAccessTokenResponse> {
        let identity = require(identity)?;
        let expires_at = match req.expires_in_secs {
            Some(secs) if secs <= 0 => {
                return Err(AuthError::ValidationError(
                    "expiresInSecs must be positive".into(),
                ));
            }
            Some(secs) => Some(
                chrono::TimeDelta::try_seconds(secs)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .ok_or_else(|| {
                        AuthError::ValidationError("expiresInSecs is too large".into())
                    })?,
            ),
            None => None,
        };

        let issued = self.authenticator.codec().issue_access_token(
            identity,
            PERSONAL_ACCESS_TOKEN_AUDIENCE,
            expires_at,
        )?;
        self.authenticator
            .store()
            .add_access_token(
                identity.user_id,
                AccessTokenRecord {
                    token_id: issued.token_id.clone(),
                    token_hash: hash_token(&issued.token),
                    description: req.description.clone(),
                    issued_at: issued.issued_at,
                    expires_at: issued.expires_at,
                },
            )
            .await?;

        info!(user_id = identity.user_id, token_id = %issued.token_id, "personal access token created");
        Ok(CreateAccessTokenResponse {
            token_id: issued.token_id,
            access_token: issued.token,
            description: req.description,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        })
    }

    pub async fn list_access_tokens(
        &self,
        identity: Option<&Identity>,
    ) -> AuthResult<ListAccessTokensResponse> {
        let identity = require(identity)?;
        let tokens = self
            .authenticator
            .store()
            .list_access_tokens(identity.user_id)
            .await?;
        Ok(ListAccessTokensResponse {
            access_tokens: tokens.iter().map(AccessTokenView::from).collect(),
        })
    }

    pub async fn revoke_access_token(
        &self,
        identity: Option<&Identity>,
        token_id: &str,
    ) -> AuthResult<Empty> {
        let identity = require(identity)?;
        let store = self.authenticator.store();
        let tokens = store.list_access_tokens(identity.user_id).await?;
        if !tokens.iter().any(|t| t.token_id == token_id) {
            return Err(AuthError::NotFound(format!("access token {token_id} not found")));
        }
        store.remove_access_token(identity.user_id, token_id).await?;
        info!(user_id = identity.user_id, token_id, "personal access token revoked");
        Ok(Empty {})
    }

    /// Store a new refresh token record and set its cookie. Stale records of
    /// the same user are swept first.
    async fn issue_refresh(
        &self,
        user: &User,
        meta: &RequestMeta,
        sink: &dyn HeaderSink,
    ) -> AuthResult<()> {
        self.prune_stale_credentials(user.id).await;

        let now = Utc::now();
        let expires_at = now + self.authenticator.settings().refresh_token_ttl;
        let token_id = Uuid::new_v4().to_string();
        let token = self
            .authenticator
            .codec()
            .issue_refresh_token(user.id, &token_id, expires_at)?;

        self.authenticator
            .store()
            .add_refresh_token(
                user.id,
                RefreshTokenRecord {
                    token_id,
                    expires_at,
                    created_at: now,
                    client_info: meta.client_info.clone(),
                },
            )
            .await?;
        set_cookie(sink, &refresh_cookie(&token, expires_at, meta.secure)?)
    }

    async fn open_session(
        &self,
        user: &User,
        meta: &RequestMeta,
        sink: &dyn HeaderSink,
    ) -> AuthResult<()> {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        self.authenticator
            .store()
            .add_session(
                user.id,
                SessionRecord {
                    session_id: session_id.clone(),
                    created_at: now,
                    last_accessed_at: now,
                    client_info: Some(meta.client_info.clone()),
                },
            )
            .await?;
        let expires_at = now + self.authenticator.settings().session_sliding;
        set_cookie(
            sink,
            &session_cookie(
                &encode_session_cookie(user.id, &session_id),
                expires_at,
                meta.secure,
            )?,
        )
    }

    fn issue_access(&self, user: &User) -> AuthResult<IssuedToken> {
        let expires_at = Utc::now() + self.authenticator.settings().access_token_ttl;
        self.authenticator.codec().issue_access_token(
            &Identity::from_user(user, CredentialKind::Claims),
            ACCESS_TOKEN_AUDIENCE,
            Some(expires_at),
        )
    }
}

fn require(identity: Option<&Identity>) -> AuthResult<&Identity> {
    identity.ok_or_else(|| AuthError::Unauthenticated("user not authenticated".into()))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use http::header::SET_COOKIE;

    use super::*;
    use crate::auth::AuthSettings;
    use crate::auth::carrier::HeaderCarrier;
    use crate::auth::jwt::TokenCodec;
    use crate::auth::password::hash_password;
    use crate::auth::request::Credentials;
    use crate::models::auth::{ClientInfo, Role, RowStatus};
    use crate::store::memory::MemoryStore;
    use crate::store::{StoreError, TokenStore, UserStore};

    const PASSWORD: &str = "s3cret-pass";

    fn setup() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(User {
            id: 1,
            username: "alice".into(),
            nickname: "Alice".into(),
            role: Role::User,
            row_status: RowStatus::Normal,
            password_hash: Some(hash_password(PASSWORD).unwrap()),
        });
        let auth = Authenticator::new(
            TokenCodec::new(b"service-secret"),
            store.clone(),
            AuthSettings::default(),
        );
        (AuthService::new(Arc::new(auth)), store)
    }

    fn sign_in_request(session: bool) -> SignInRequest {
        SignInRequest {
            username: "alice".into(),
            password: PASSWORD.into(),
            session,
        }
    }

    /// Pull `name=value` out of the carrier's `Set-Cookie` headers.
    fn cookie_from(carrier: &HeaderCarrier, name: &str) -> Option<String> {
        carrier
            .all()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| cookie::Cookie::parse(v.to_string()).ok())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    fn meta_with_refresh(token: &str) -> RequestMeta {
        RequestMeta {
            credentials: Credentials {
                refresh: Some(token.to_string()),
                ..Credentials::default()
            },
            ..RequestMeta::default()
        }
    }

    #[tokio::test]
    async fn sign_in_sets_refresh_cookie_and_records_client() {
        let (service, store) = setup();
        let carrier = HeaderCarrier::new();
        let meta = RequestMeta {
            client_info: ClientInfo::from_user_agent("curl/8.0".into(), "10.1.1.1".into()),
            ..RequestMeta::default()
        };

        let resp = service
            .sign_in(sign_in_request(false), &meta, &carrier)
            .await
            .unwrap();
        assert_eq!(resp.user.username, "alice");
        assert!(resp.access_token_expires_at > Utc::now());
        assert!(cookie_from(&carrier, REFRESH_COOKIE).is_some());
        assert!(cookie_from(&carrier, SESSION_COOKIE).is_none());

        let records = store.list_refresh_tokens(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].client_info.ip_address, "10.1.1.1");
        assert!(records[0].expires_at > Utc::now() + Duration::days(29));
    }

    #[tokio::test]
    async fn sign_in_can_open_a_session() {
        let (service, store) = setup();
        let carrier = HeaderCarrier::new();
        service
            .sign_in(sign_in_request(true), &RequestMeta::default(), &carrier)
            .await
            .unwrap();

        let sessions = store.list_sessions(1).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let value = cookie_from(&carrier, SESSION_COOKIE).unwrap();
        assert_eq!(value, format!("1-{}", sessions[0].session_id));
    }

    #[tokio::test]
    async fn sign_in_rejects_bad_password_and_archived_users() {
        let (service, store) = setup();
        let carrier = HeaderCarrier::new();
        let wrong = SignInRequest {
            password: "nope".into(),
            ..sign_in_request(false)
        };
        assert!(matches!(
            service.sign_in(wrong, &RequestMeta::default(), &carrier).await,
            Err(AuthError::CredentialError)
        ));

        store.update_user(1, |u| u.row_status = RowStatus::Archived);
        assert!(matches!(
            service
                .sign_in(sign_in_request(false), &RequestMeta::default(), &carrier)
                .await,
            Err(AuthError::Archived)
        ));
        assert!(carrier.is_empty());
    }

    #[tokio::test]
    async fn rotation_replaces_the_old_token() {
        let (service, store) = setup();
        let carrier = HeaderCarrier::new();
        service
            .sign_in(sign_in_request(false), &RequestMeta::default(), &carrier)
            .await
            .unwrap();
        let old = cookie_from(&carrier, REFRESH_COOKIE).unwrap();
        let old_tid = store.list_refresh_tokens(1).await.unwrap()[0].token_id.clone();

        let carrier = HeaderCarrier::new();
        let resp = service
            .refresh_token(&meta_with_refresh(&old), &carrier)
            .await
            .unwrap();
        assert!(!resp.access_token.is_empty());
        let new = cookie_from(&carrier, REFRESH_COOKIE).unwrap();
        assert_ne!(new, old);

        let records = store.list_refresh_tokens(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].token_id, old_tid);

        // The old token is single-use.
        let again = service
            .refresh_token(&meta_with_refresh(&old), &HeaderCarrier::new())
            .await;
        assert!(matches!(again, Err(AuthError::Revoked)));
    }

    /// Memory store that yields to the scheduler before every call, so two
    /// operations joined on one task interleave at each store access.
    struct YieldingStore(Arc<MemoryStore>);

    #[async_trait]
    impl UserStore for YieldingStore {
        async fn get_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get_user_by_id(user_id).await
        }

        async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get_user_by_username(username).await
        }
    }

    #[async_trait]
    impl TokenStore for YieldingStore {
        async fn list_refresh_tokens(
            &self,
            user_id: i32,
        ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
            tokio::task::yield_now().await;
            self.0.list_refresh_tokens(user_id).await
        }

        async fn add_refresh_token(
            &self,
            user_id: i32,
            record: RefreshTokenRecord,
        ) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.add_refresh_token(user_id, record).await
        }

        async fn remove_refresh_token(
            &self,
            user_id: i32,
            token_id: &str,
        ) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.remove_refresh_token(user_id, token_id).await
        }

        async fn list_sessions(&self, user_id: i32) -> Result<Vec<SessionRecord>, StoreError> {
            tokio::task::yield_now().await;
            self.0.list_sessions(user_id).await
        }

        async fn add_session(&self, user_id: i32, record: SessionRecord) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.add_session(user_id, record).await
        }

        async fn remove_session(&self, user_id: i32, session_id: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.remove_session(user_id, session_id).await
        }

        async fn touch_session(
            &self,
            user_id: i32,
            session_id: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.touch_session(user_id, session_id, at).await
        }

        async fn list_access_tokens(
            &self,
            user_id: i32,
        ) -> Result<Vec<AccessTokenRecord>, StoreError> {
            tokio::task::yield_now().await;
            self.0.list_access_tokens(user_id).await
        }

        async fn add_access_token(
            &self,
            user_id: i32,
            record: AccessTokenRecord,
        ) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.add_access_token(user_id, record).await
        }

        async fn remove_access_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.remove_access_token(user_id, token_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_rotation_never_leaves_zero_tokens() {
        let (plain, store) = setup();
        let service = AuthService::new(Arc::new(Authenticator::new(
            TokenCodec::new(b"service-secret"),
            Arc::new(YieldingStore(store.clone())),
            AuthSettings::default(),
        )));
        let carrier = HeaderCarrier::new();
        plain
            .sign_in(sign_in_request(false), &RequestMeta::default(), &carrier)
            .await
            .unwrap();
        let old_tid = store.list_refresh_tokens(1).await.unwrap()[0].token_id.clone();
        let meta = meta_with_refresh(&cookie_from(&carrier, REFRESH_COOKIE).unwrap());

        // Both rotations read the old record before either one removes it.
        let first_sink = HeaderCarrier::new();
        let second_sink = HeaderCarrier::new();
        let (a, b) = tokio::join!(
            service.refresh_token(&meta, &first_sink),
            service.refresh_token(&meta, &second_sink),
        );
        assert!(a.is_ok(), "{a:?}");
        assert!(b.is_ok(), "{b:?}");

        let records = store.list_refresh_tokens(1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.token_id != old_tid));
        for sink in [&first_sink, &second_sink] {
            let fresh = cookie_from(sink, REFRESH_COOKIE).unwrap();
            assert!(
                service
                    .authenticator()
                    .authenticate_by_refresh_token(&fresh)
                    .await
                    .is_ok()
            );
        }
    }

    #[tokio::test]
    async fn issuing_a_refresh_token_sweeps_stale_records() {
        let (service, store) = setup();
        let long_ago = Utc::now() - Duration::days(60);
        store
            .add_refresh_token(
                1,
                RefreshTokenRecord {
                    token_id: "expired".into(),
                    expires_at: long_ago,
                    created_at: long_ago,
                    client_info: ClientInfo::default(),
                },
            )
            .await
            .unwrap();
        store
            .add_session(
                1,
                SessionRecord {
                    session_id: "idle".into(),
                    created_at: long_ago,
                    last_accessed_at: long_ago,
                    client_info: None,
                },
            )
            .await
            .unwrap();

        service
            .sign_in(sign_in_request(false), &RequestMeta::default(), &HeaderCarrier::new())
            .await
            .unwrap();

        let refresh = store.list_refresh_tokens(1).await.unwrap();
        assert_eq!(refresh.len(), 1);
        assert_ne!(refresh[0].token_id, "expired");
        assert!(store.list_sessions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_without_cookie_is_unauthenticated() {
        let (service, _) = setup();
        let err = service
            .refresh_token(&RequestMeta::default(), &HeaderCarrier::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn sign_out_is_idempotent_and_clears_cookies() {
        let (service, store) = setup();
        let carrier = HeaderCarrier::new();
        service
            .sign_in(sign_in_request(true), &RequestMeta::default(), &carrier)
            .await
            .unwrap();
        let meta = RequestMeta {
            credentials: Credentials {
                refresh: cookie_from(&carrier, REFRESH_COOKIE),
                session: cookie_from(&carrier, SESSION_COOKIE),
                bearer: None,
            },
            ..RequestMeta::default()
        };

        let out = HeaderCarrier::new();
        service.sign_out(&meta, &out).await.unwrap();
        assert!(store.list_refresh_tokens(1).await.unwrap().is_empty());
        assert!(store.list_sessions(1).await.unwrap().is_empty());
        assert_eq!(cookie_from(&out, REFRESH_COOKIE).as_deref(), Some(""));
        assert_eq!(cookie_from(&out, SESSION_COOKIE).as_deref(), Some(""));

        let out = HeaderCarrier::new();
        service
            .sign_out(&RequestMeta::default(), &out)
            .await
            .unwrap();
        assert_eq!(out.all().get_all(SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn listing_refresh_tokens_drops_expired_records() {
        let (service, store) = setup();
        let now = Utc::now();
        for (tid, expires_at) in [("live", now + Duration::days(1)), ("dead", now - Duration::days(1))] {
            store
                .add_refresh_token(
                    1,
                    RefreshTokenRecord {
                        token_id: tid.into(),
                        expires_at,
                        created_at: now,
                        client_info: ClientInfo::default(),
                    },
                )
                .await
                .unwrap();
        }

        let live = service.list_refresh_tokens(1).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token_id, "live");
        assert_eq!(store.list_refresh_tokens(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn current_user_requires_identity() {
        let (service, store) = setup();
        assert!(matches!(
            service.get_current_user(None).await,
            Err(AuthError::Unauthenticated(_))
        ));

        let user = store.get_user_by_id(1).await.unwrap().unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Claims);
        let resp = service.get_current_user(Some(&identity)).await.unwrap();
        assert_eq!(resp.user.name, "users/1");
    }

    #[tokio::test]
    async fn personal_access_tokens_lifecycle() {
        let (service, _) = setup();
        let user = service
            .authenticator()
            .store()
            .get_user_by_id(1)
            .await
            .unwrap()
            .unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Claims);

        let created = service
            .create_access_token(
                Some(&identity),
                CreateAccessTokenRequest {
                    description: "backup script".into(),
                    expires_in_secs: Some(3600),
                },
            )
            .await
            .unwrap();
        assert!(created.expires_at.is_some());

        let resolved = service
            .authenticator()
            .authenticate_by_jwt(&created.access_token)
            .await
            .unwrap();
        assert_eq!(resolved.kind, CredentialKind::UserLookup);

        let listed = service.list_access_tokens(Some(&identity)).await.unwrap();
        assert_eq!(listed.access_tokens.len(), 1);
        assert_eq!(listed.access_tokens[0].description, "backup script");

        service
            .revoke_access_token(Some(&identity), &created.token_id)
            .await
            .unwrap();
        assert!(matches!(
            service
                .authenticator()
                .authenticate_by_jwt(&created.access_token)
                .await,
            Err(AuthError::Revoked)
        ));
        assert!(matches!(
            service
                .revoke_access_token(Some(&identity), &created.token_id)
                .await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn access_token_lifetime_must_be_positive() {
        let (service, store) = setup();
        let user = store.get_user_by_id(1).await.unwrap().unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Claims);
        let err = service
            .create_access_token(
                Some(&identity),
                CreateAccessTokenRequest {
                    description: String::new(),
                    expires_in_secs: Some(0),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[tokio::test]
    async fn access_token_lifetime_overflow_is_rejected() {
        let (service, store) = setup();
        let user = store.get_user_by_id(1).await.unwrap().unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Claims);
        for secs in [i64::MAX, 10_000_000_000_000] {
            let err = service
                .create_access_token(
                    Some(&identity),
                    CreateAccessTokenRequest {
                        description: "forever".into(),
                        expires_in_secs: Some(secs),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::ValidationError(_)), "{secs}: {err:?}");
        }
        assert!(store.list_access_tokens(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn personal_access_token_is_stored_as_a_digest() {
        let (service, store) = setup();
        let user = store.get_user_by_id(1).await.unwrap().unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Claims);
        let created = service
            .create_access_token(
                Some(&identity),
                CreateAccessTokenRequest {
                    description: "ci".into(),
                    expires_in_secs: None,
                },
            )
            .await
            .unwrap();

        let records = store.list_access_tokens(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_hash, hash_token(&created.access_token));
        assert_eq!(records[0].token_hash.len(), 64);
        let stored = serde_json::to_string(&records[0]).unwrap();
        assert!(!stored.contains(&created.access_token));
    }

    #[tokio::test]
    async fn sessions_can_be_listed_and_revoked() {
        let (service, store) = setup();
        service
            .sign_in(sign_in_request(true), &RequestMeta::default(), &HeaderCarrier::new())
            .await
            .unwrap();
        let user = store.get_user_by_id(1).await.unwrap().unwrap();
        let identity = Identity::from_user(&user, CredentialKind::Session);

        let listed = service.list_sessions(Some(&identity)).await.unwrap();
        assert_eq!(listed.sessions.len(), 1);
        let id = listed.sessions[0].session_id.clone();

        service.revoke_session(Some(&identity), &id).await.unwrap();
        assert!(service.list_sessions(Some(&identity)).await.unwrap().sessions.is_empty());
        assert!(matches!(
            service.revoke_session(Some(&identity), &id).await,
            Err(AuthError::NotFound(_))
        ));
    }
}
