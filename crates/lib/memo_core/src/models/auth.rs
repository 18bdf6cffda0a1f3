//! Authentication domain models.
//!
//! Only the user fields needed for authentication decisions live here; the
//! full profile model belongs to the entity store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role. `Host` is the instance owner; `Admin` and `Host` pass admin gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Whether this role may call admin-only operations.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Host | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Role::Host),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Row status of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Normal,
    Archived,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Normal => "normal",
            RowStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RowStatus::Normal),
            "archived" => Ok(RowStatus::Archived),
            other => Err(format!("unknown row status: {other}")),
        }
    }
}

/// Domain user, as far as authentication is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub nickname: String,
    pub role: Role,
    pub row_status: RowStatus,
    pub password_hash: Option<String>,
}

impl User {
    pub fn is_archived(&self) -> bool {
        self.row_status == RowStatus::Archived
    }
}

/// Which kind of credential produced a [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Stateless access token; role and status were read from its claims.
    Claims,
    /// Personal access token; the user was re-fetched from the store.
    UserLookup,
    /// Session cookie.
    Session,
}

/// The adapter-agnostic result of authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
    pub row_status: RowStatus,
    pub kind: CredentialKind,
}

impl Identity {
    pub fn from_user(user: &User, kind: CredentialKind) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            row_status: user.row_status,
            kind,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_archived(&self) -> bool {
        self.row_status == RowStatus::Archived
    }
}

/// Snapshot of the client that created a token or session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub user_agent: String,
    pub ip_address: String,
    /// `desktop`, `mobile` or `tablet`.
    pub device_type: String,
    pub os: String,
    pub browser: String,
}

/// Refresh token record stored per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub client_info: ClientInfo,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Cookie session record stored per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub client_info: Option<ClientInfo>,
}

/// Personal access token record stored per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    /// Token id (the `jti` claim), used to revoke it.
    pub token_id: String,
    /// SHA-256 hex digest of the signed token. The token itself is only
    /// shown once, at creation.
    pub token_hash: String,
    pub description: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
