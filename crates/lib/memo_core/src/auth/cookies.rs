//! Auth cookies: build, serialize and clear.
//!
//! Cookie names: `memos_refresh` (refresh token) and `user_session`
//! (`{userID}-{sessionID}`).

use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use http::HeaderMap;
use http::header::{HeaderValue, ORIGIN, SET_COOKIE};
use time::OffsetDateTime;

use super::carrier::HeaderSink;
use super::{AuthError, AuthResult};

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "memos_refresh";
/// Cookie name for the composite session id.
pub const SESSION_COOKIE: &str = "user_session";

/// Whether the request came from an HTTPS page, judged by its `Origin`.
pub fn is_secure_origin(headers: &HeaderMap) -> bool {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|origin| origin.starts_with("https://"))
}

fn to_offset(at: DateTime<Utc>) -> AuthResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| AuthError::Internal(format!("cookie expiry out of range: {e}")))
}

fn build(name: &str, value: String, expires: OffsetDateTime, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .expires(expires)
        .build()
}

/// Refresh-token cookie expiring with the token.
pub fn refresh_cookie(
    token: &str,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> AuthResult<Cookie<'static>> {
    Ok(build(
        REFRESH_COOKIE,
        token.to_string(),
        to_offset(expires_at)?,
        secure,
    ))
}

/// Session cookie carrying the composite session id.
pub fn session_cookie(
    value: &str,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> AuthResult<Cookie<'static>> {
    Ok(build(
        SESSION_COOKIE,
        value.to_string(),
        to_offset(expires_at)?,
        secure,
    ))
}

/// Empty cookie that expired at the epoch, clearing `name` in the browser.
pub fn clear_cookie(name: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = build(name, String::new(), OffsetDateTime::UNIX_EPOCH, secure);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// Append `cookie` as a `Set-Cookie` header on `sink`.
pub fn set_cookie(sink: &dyn HeaderSink, cookie: &Cookie<'_>) -> AuthResult<()> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AuthError::Internal(format!("invalid cookie header: {e}")))?;
    sink.append(SET_COOKIE, value);
    Ok(())
}
