//! Client snapshot captured when a refresh token or session is created.

use http::HeaderMap;
use http::header::USER_AGENT;

use crate::models::auth::ClientInfo;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

impl ClientInfo {
    /// Capture user agent and client IP from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_agent = header_str(headers, USER_AGENT.as_str()).unwrap_or_default();
        let ip_address = header_str(headers, X_FORWARDED_FOR)
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty())
            .or_else(|| header_str(headers, X_REAL_IP))
            .unwrap_or_default();
        Self::from_user_agent(user_agent, ip_address)
    }

    pub fn from_user_agent(user_agent: String, ip_address: String) -> Self {
        Self {
            device_type: device_type(&user_agent).to_string(),
            os: os(&user_agent).to_string(),
            browser: browser(&user_agent).to_string(),
            user_agent,
            ip_address,
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

fn device_type(ua: &str) -> &'static str {
    if ua.contains("iPad") || ua.contains("Tablet") {
        "tablet"
    } else if ua.contains("Android") && !ua.contains("Mobile") {
        "tablet"
    } else if ua.contains("Mobile") || ua.contains("iPhone") {
        "mobile"
    } else {
        "desktop"
    }
}

fn os(ua: &str) -> &'static str {
    // iOS user agents also contain "like Mac OS X".
    if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "macOS"
    } else if ua.contains("CrOS") {
        "ChromeOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        ""
    }
}

fn browser(ua: &str) -> &'static str {
    // Order matters: Edge and Opera also advertise Chrome and Safari.
    if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

    #[test]
    fn parses_common_user_agents() {
        let mac = ClientInfo::from_user_agent(CHROME_MAC.into(), String::new());
        assert_eq!((mac.device_type.as_str(), mac.os.as_str(), mac.browser.as_str()), ("desktop", "macOS", "Chrome"));

        let phone = ClientInfo::from_user_agent(SAFARI_IPHONE.into(), String::new());
        assert_eq!((phone.device_type.as_str(), phone.os.as_str(), phone.browser.as_str()), ("mobile", "iOS", "Safari"));

        let edge = ClientInfo::from_user_agent(EDGE_WINDOWS.into(), String::new());
        assert_eq!((edge.os.as_str(), edge.browser.as_str()), ("Windows", "Edge"));
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(X_REAL_IP, HeaderValue::from_static("10.0.0.9"));
        assert_eq!(ClientInfo::from_headers(&headers).ip_address, "203.0.113.7");

        headers.remove(X_FORWARDED_FOR);
        assert_eq!(ClientInfo::from_headers(&headers).ip_address, "10.0.0.9");
    }
}
