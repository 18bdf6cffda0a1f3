//! In-memory store.
//!
//! Backs tests and single-process deployments. Each user's credential lists
//! sit behind one `DashMap` entry, so a single add or remove is atomic for
//! that user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{StoreError, TokenStore, UserStore};
use crate::models::auth::{AccessTokenRecord, RefreshTokenRecord, SessionRecord, User};

#[derive(Debug, Default)]
struct UserCredentials {
    refresh_tokens: Vec<RefreshTokenRecord>,
    sessions: Vec<SessionRecord>,
    access_tokens: Vec<AccessTokenRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<i32, User>,
    credentials: DashMap<i32, UserCredentials>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Apply `f` to a stored user, returning false if it does not exist.
    pub fn update_user(&self, user_id: i32, f: impl FnOnce(&mut User)) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                f(&mut user);
                true
            }
            None => false,
        }
    }

    /// Next free user id.
    pub fn next_user_id(&self) -> i32 {
        self.users.iter().map(|u| *u.key()).max().unwrap_or(0) + 1
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone()))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn list_refresh_tokens(
        &self,
        user_id: i32,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|c| c.refresh_tokens.clone())
            .unwrap_or_default())
    }

    async fn add_refresh_token(
        &self,
        user_id: i32,
        record: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        self.credentials
            .entry(user_id)
            .or_default()
            .refresh_tokens
            .push(record);
        Ok(())
    }

    async fn remove_refresh_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError> {
        if let Some(mut c) = self.credentials.get_mut(&user_id) {
            c.refresh_tokens.retain(|t| t.token_id != token_id);
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: i32) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|c| c.sessions.clone())
            .unwrap_or_default())
    }

    async fn add_session(&self, user_id: i32, record: SessionRecord) -> Result<(), StoreError> {
        self.credentials
            .entry(user_id)
            .or_default()
            .sessions
            .push(record);
        Ok(())
    }

    async fn remove_session(&self, user_id: i32, session_id: &str) -> Result<(), StoreError> {
        if let Some(mut c) = self.credentials.get_mut(&user_id) {
            c.sessions.retain(|s| s.session_id != session_id);
        }
        Ok(())
    }

    async fn touch_session(
        &self,
        user_id: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut c) = self.credentials.get_mut(&user_id)
            && let Some(session) = c.sessions.iter_mut().find(|s| s.session_id == session_id)
        {
            session.last_accessed_at = at;
        }
        Ok(())
    }

    async fn list_access_tokens(
        &self,
        user_id: i32,
    ) -> Result<Vec<AccessTokenRecord>, StoreError> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|c| c.access_tokens.clone())
            .unwrap_or_default())
    }

    async fn add_access_token(
        &self,
        user_id: i32,
        record: AccessTokenRecord,
    ) -> Result<(), StoreError> {
        self.credentials
            .entry(user_id)
            .or_default()
            .access_tokens
            .push(record);
        Ok(())
    }

    async fn remove_access_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError> {
        if let Some(mut c) = self.credentials.get_mut(&user_id) {
            c.access_tokens.retain(|t| t.token_id != token_id);
        }
        Ok(())
    }
}
