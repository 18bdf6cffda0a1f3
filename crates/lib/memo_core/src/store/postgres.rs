//! PostgreSQL store.
//!
//! Schema lives in `memo_core/migrations/`. Client info snapshots are kept as
//! JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{StoreError, TokenStore, UserStore};
use crate::models::auth::{
    AccessTokenRecord, ClientInfo, RefreshTokenRecord, Role, SessionRecord, User,
};

type UserRow = (i32, String, String, String, String, Option<String>);

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Create a user, returning its id.
    pub async fn create_user(
        &self,
        username: &str,
        nickname: &str,
        role: Role,
        password_hash: &str,
    ) -> Result<i32, StoreError> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO users (username, nickname, role, row_status, password_hash) \
             VALUES ($1, $2, $3, 'normal', $4) RETURNING id",
        )
        .bind(username)
        .bind(nickname)
        .bind(role.as_str())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, username, nickname, role, row_status, password_hash) = row;
    Ok(User {
        id,
        username,
        nickname,
        role: role.parse().map_err(StoreError::Decode)?,
        row_status: row_status.parse().map_err(StoreError::Decode)?,
        password_hash,
    })
}

fn encode_client(info: &ClientInfo) -> Result<String, StoreError> {
    serde_json::to_string(info).map_err(|e| StoreError::Decode(format!("client info: {e}")))
}

fn decode_client(raw: &str) -> Result<ClientInfo, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Decode(format!("client info: {e}")))
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, nickname, role, row_status, password_hash \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, nickname, role, row_status, password_hash \
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).transpose()
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn list_refresh_tokens(
        &self,
        user_id: i32,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>, String)>(
            "SELECT token_id, expires_at, created_at, client_info \
             FROM user_refresh_tokens WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(
                |(token_id, expires_at, created_at, client)| -> Result<_, StoreError> {
                    Ok(RefreshTokenRecord {
                        token_id,
                        expires_at,
                        created_at,
                        client_info: decode_client(&client)?,
                    })
                },
            )
            .collect()
    }

    async fn add_refresh_token(
        &self,
        user_id: i32,
        record: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_refresh_tokens (user_id, token_id, expires_at, created_at, client_info) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(&record.token_id)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(encode_client(&record.client_info)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_refresh_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_refresh_tokens WHERE user_id = $1 AND token_id = $2")
            .bind(user_id)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_sessions(&self, user_id: i32) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>, Option<String>)>(
            "SELECT session_id, created_at, last_accessed_at, client_info \
             FROM user_sessions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(
                |(session_id, created_at, last_accessed_at, client)| -> Result<_, StoreError> {
                    Ok(SessionRecord {
                        session_id,
                        created_at,
                        last_accessed_at,
                        client_info: client.as_deref().map(decode_client).transpose()?,
                    })
                },
            )
            .collect()
    }

    async fn add_session(&self, user_id: i32, record: SessionRecord) -> Result<(), StoreError> {
        let client = record.client_info.as_ref().map(encode_client).transpose()?;
        sqlx::query(
            "INSERT INTO user_sessions (user_id, session_id, created_at, last_accessed_at, client_info) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(&record.session_id)
        .bind(record.created_at)
        .bind(record.last_accessed_at)
        .bind(client)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_session(&self, user_id: i32, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1 AND session_id = $2")
            .bind(user_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_session(
        &self,
        user_id: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_sessions SET last_accessed_at = $3 \
             WHERE user_id = $1 AND session_id = $2",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_access_tokens(
        &self,
        user_id: i32,
    ) -> Result<Vec<AccessTokenRecord>, StoreError> {
        let rows = sqlx::query_as::<
            _,
            (String, String, String, DateTime<Utc>, Option<DateTime<Utc>>),
        >(
            "SELECT token_id, token_hash, description, issued_at, expires_at \
             FROM user_access_tokens WHERE user_id = $1 ORDER BY issued_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(token_id, token_hash, description, issued_at, expires_at)| AccessTokenRecord {
                    token_id,
                    token_hash,
                    description,
                    issued_at,
                    expires_at,
                },
            )
            .collect())
    }

    async fn add_access_token(
        &self,
        user_id: i32,
        record: AccessTokenRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_access_tokens \
             (user_id, token_id, token_hash, description, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(&record.token_id)
        .bind(&record.token_hash)
        .bind(&record.description)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_access_token(&self, user_id: i32, token_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_access_tokens WHERE user_id = $1 AND token_id = $2")
            .bind(user_id)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
