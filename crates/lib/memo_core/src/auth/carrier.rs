//! Response header carrier.
//!
//! Shared auth logic calls [`HeaderSink::set`]/[`HeaderSink::append`] without
//! knowing which transport is serving the request. The HTTP adapters inject a
//! [`HeaderCarrier`] into request extensions and copy its contents onto the
//! real response once the handler returns; the native RPC adapter writes
//! straight into response metadata instead.

use std::sync::{Arc, Mutex};

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use tracing::warn;

/// Somewhere response headers can be written.
pub trait HeaderSink: Send + Sync {
    /// Replace any existing values for `name`.
    fn set(&self, name: HeaderName, value: HeaderValue);

    /// Add a value, keeping existing ones (`Set-Cookie` needs this).
    fn append(&self, name: HeaderName, value: HeaderValue);
}

/// Request-scoped header buffer. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct HeaderCarrier {
    headers: Arc<Mutex<HeaderMap>>,
}

impl HeaderCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().get(name).cloned()
    }

    /// Snapshot of every captured header.
    pub fn all(&self) -> HeaderMap {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append every captured header onto `target`, draining the buffer.
    pub fn flush_into(&self, target: &mut HeaderMap) {
        let captured = std::mem::take(&mut *self.lock());
        let mut current: Option<HeaderName> = None;
        for (name, value) in captured {
            // `HeaderMap::into_iter` yields the name only on the first value.
            if let Some(name) = name {
                current = Some(name);
            }
            match &current {
                Some(name) => {
                    target.append(name.clone(), value);
                }
                None => warn!("dropping header value without a name"),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        self.headers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HeaderSink for HeaderCarrier {
    fn set(&self, name: HeaderName, value: HeaderValue) {
        self.lock().insert(name, value);
    }

    fn append(&self, name: HeaderName, value: HeaderValue) {
        self.lock().append(name, value);
    }
}

#[cfg(test)]
mod tests {
    use http::header::{CACHE_CONTROL, SET_COOKIE};

    use super::*;

    #[test]
    fn clones_share_one_buffer() {
        let carrier = HeaderCarrier::new();
        let handle = carrier.clone();
        handle.set(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert_eq!(
            carrier.get(&CACHE_CONTROL),
            Some(HeaderValue::from_static("no-store"))
        );
    }

    #[test]
    fn flush_appends_every_cookie_and_drains() {
        let carrier = HeaderCarrier::new();
        carrier.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        carrier.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        carrier.set(CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let mut response = HeaderMap::new();
        response.append(SET_COOKIE, HeaderValue::from_static("existing=0"));
        carrier.flush_into(&mut response);

        let cookies: Vec<_> = response.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 3);
        assert_eq!(response.get(CACHE_CONTROL).unwrap(), "no-store");
        assert!(carrier.is_empty());
    }

    #[test]
    fn set_replaces_previous_values() {
        let carrier = HeaderCarrier::new();
        carrier.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        carrier.set(SET_COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(carrier.all().get_all(SET_COOKIE).iter().count(), 1);
    }
}
