//! Credential extraction from request headers.
//!
//! gRPC metadata, Connect headers and plain HTTP headers all arrive as an
//! `http::HeaderMap`, so every adapter shares this extraction and sees the
//! same credentials in the same order.

use cookie::Cookie;
use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE};
use tracing::debug;

use super::cookies::{REFRESH_COOKIE, SESSION_COOKIE, is_secure_origin};
use crate::models::auth::ClientInfo;

/// Cookie header name used by grpc-gateway when forwarding browser cookies.
pub const GATEWAY_COOKIE: &str = "grpcgateway-cookie";

/// Raw credentials found on a request. Nothing here has been verified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// `user_session` cookie value.
    pub session: Option<String>,
    /// Token from `Authorization: Bearer ...`.
    pub bearer: Option<String>,
    /// `memos_refresh` cookie value.
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            session: cookie_value(headers, SESSION_COOKIE),
            bearer: bearer_token(headers),
            refresh: cookie_value(headers, REFRESH_COOKIE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.bearer.is_none() && self.refresh.is_none()
    }
}

/// Everything the auth operations need to know about the caller's request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub credentials: Credentials,
    pub client_info: ClientInfo,
    /// Whether cookies should carry `Secure`.
    pub secure: bool,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            credentials: Credentials::from_headers(headers),
            client_info: ClientInfo::from_headers(headers),
            secure: is_secure_origin(headers),
        }
    }
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        debug!(scheme, "ignoring non-bearer authorization header");
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Find a cookie by name across `Cookie` and `grpcgateway-cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .chain(headers.get_all(GATEWAY_COOKIE).iter())
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn cookies_are_found_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("user_session=7-abc; other=1"));
        headers.insert(GATEWAY_COOKIE, HeaderValue::from_static("memos_refresh=r.t.k"));

        let creds = Credentials::from_headers(&headers);
        assert_eq!(creds.session.as_deref(), Some("7-abc"));
        assert_eq!(creds.refresh.as_deref(), Some("r.t.k"));
        assert_eq!(creds.bearer, None);
        assert!(!creds.is_empty());
    }

    #[test]
    fn empty_cookie_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("memos_refresh="));
        assert!(Credentials::from_headers(&headers).is_empty());
    }
}
