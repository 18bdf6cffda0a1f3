//! API server configuration.

use chrono::Duration;
use memo_core::auth::jwt::resolve_jwt_secret;
use memo_core::auth::{
    ACCESS_TOKEN_TTL_SECS, AuthSettings, REFRESH_TOKEN_TTL_DAYS, SESSION_SLIDING_DAYS,
};
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8081").
    pub bind_addr: String,
    /// PostgreSQL connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Credential lifetimes.
    pub auth: AuthSettings,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                  | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `BIND_ADDR`               | `127.0.0.1:8081`                 |
    /// | `DATABASE_URL`            | unset (in-memory store)          |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file |
    /// | `ACCESS_TOKEN_TTL_SECS`   | `900`                            |
    /// | `REFRESH_TOKEN_TTL_DAYS`  | `30`                             |
    /// | `SESSION_SLIDING_DAYS`    | `14`                             |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8081".into()),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            jwt_secret: resolve_jwt_secret(),
            auth: AuthSettings {
                access_token_ttl: Duration::seconds(env_i64(
                    "ACCESS_TOKEN_TTL_SECS",
                    ACCESS_TOKEN_TTL_SECS,
                )),
                refresh_token_ttl: Duration::days(env_i64(
                    "REFRESH_TOKEN_TTL_DAYS",
                    REFRESH_TOKEN_TTL_DAYS,
                )),
                session_sliding: Duration::days(env_i64(
                    "SESSION_SLIDING_DAYS",
                    SESSION_SLIDING_DAYS,
                )),
            },
        }
    }

    /// Configuration for tests and embedding: in-memory store, fixed secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: secret.into(),
            auth: AuthSettings::default(),
        }
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!(name, value = %raw, default, "ignoring invalid duration setting");
                default
            }
        },
        Err(_) => default,
    }
}
