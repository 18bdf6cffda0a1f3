//! Entity store collaborator.
//!
//! The authentication core only needs user lookups and the three per-user
//! credential lists. Every add/remove must be atomic per user so concurrent
//! rotations never lose each other's writes.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{AccessTokenRecord, RefreshTokenRecord, SessionRecord, User};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Malformed stored value: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Backend(String),
}

/// User lookups.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// Per-user credential lists.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn list_refresh_tokens(
        &self,
        user_id: i32,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    async fn add_refresh_token(
        &self,
        user_id: i32,
        record: RefreshTokenRecord,
    ) -> Result<(), StoreError>;

    /// Removing an id that is not present is not an error.
    async fn remove_refresh_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError>;

    async fn list_sessions(&self, user_id: i32) -> Result<Vec<SessionRecord>, StoreError>;

    async fn add_session(&self, user_id: i32, record: SessionRecord) -> Result<(), StoreError>;

    async fn remove_session(&self, user_id: i32, session_id: &str) -> Result<(), StoreError>;

    async fn touch_session(
        &self,
        user_id: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_access_tokens(&self, user_id: i32)
    -> Result<Vec<AccessTokenRecord>, StoreError>;

    async fn add_access_token(
        &self,
        user_id: i32,
        record: AccessTokenRecord,
    ) -> Result<(), StoreError>;

    async fn remove_access_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError>;
}

/// Everything the authentication core consumes from the entity store.
pub trait Store: UserStore + TokenStore {}

impl<T: UserStore + TokenStore> Store for T {}

/// Shared store handle.
pub type StoreArc = Arc<dyn Store>;
