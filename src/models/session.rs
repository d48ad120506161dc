use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{ensure_non_empty, ChatMessage};

/// A saved transcript. Sessions are snapshots: created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

/// History storage as seen by one identity. Every operation is implicitly
/// scoped to that identity (its device store or its account).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, messages: &[ChatMessage]) -> Result<String, AppError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<ChatSession>, AppError>;

    /// Deleting an unknown id is a no-op.
    async fn delete_one(&self, id: &str) -> Result<(), AppError>;

    /// Returns how many sessions were removed.
    async fn delete_all(&self) -> Result<u64, AppError>;
}

/// Account-scoped storage shared by every persistent account.
#[async_trait]
pub trait CloudSessions: Send + Sync {
    async fn save(&self, account_id: &str, messages: &[ChatMessage]) -> Result<String, AppError>;
    async fn list_for_account(&self, account_id: &str) -> Result<Vec<ChatSession>, AppError>;
    async fn delete_one(&self, account_id: &str, id: &str) -> Result<(), AppError>;
    async fn delete_all_for_account(&self, account_id: &str) -> Result<u64, AppError>;
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    messages: Json<Vec<ChatMessage>>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        ChatSession {
            id: row.id.to_string(),
            messages: row.messages.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        PgSessionStore { pool }
    }
}

#[async_trait]
impl CloudSessions for PgSessionStore {
    async fn save(&self, account_id: &str, messages: &[ChatMessage]) -> Result<String, AppError> {
        ensure_non_empty(messages)?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, user_id, messages)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(account_id)
        .bind(Json(messages.to_vec()))
        .execute(&self.pool)
        .await?;

        debug!(session_id = %id, user_id = account_id, "Chat session saved");
        Ok(id.to_string())
    }

    async fn list_for_account(&self, account_id: &str) -> Result<Vec<ChatSession>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, messages, created_at FROM chat_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatSession::from).collect())
    }

    async fn delete_one(&self, account_id: &str, id: &str) -> Result<(), AppError> {
        // Ids that were never minted here cannot exist, so there is nothing to delete.
        let Ok(id) = Uuid::parse_str(id) else {
            debug!(session_id = id, "Ignoring delete of malformed session id");
            return Ok(());
        };

        sqlx::query(
            r#"
            DELETE FROM chat_sessions
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %id, user_id = account_id, "Chat session deleted");
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: &str) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM chat_sessions
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM chat_sessions
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(user_id = account_id, deleted, "Deleted all chat sessions for account");
        Ok(deleted)
    }
}

/// The cloud store bound to one persistent account.
pub struct AccountSessions {
    cloud: Arc<dyn CloudSessions>,
    account_id: String,
}

impl AccountSessions {
    pub fn new(cloud: Arc<dyn CloudSessions>, account_id: &str) -> Self {
        AccountSessions {
            cloud,
            account_id: account_id.to_string(),
        }
    }
}

#[async_trait]
impl SessionStore for AccountSessions {
    async fn save(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        self.cloud.save(&self.account_id, messages).await
    }

    async fn list(&self) -> Result<Vec<ChatSession>, AppError> {
        self.cloud.list_for_account(&self.account_id).await
    }

    async fn delete_one(&self, id: &str) -> Result<(), AppError> {
        self.cloud.delete_one(&self.account_id, id).await
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        self.cloud.delete_all_for_account(&self.account_id).await
    }
}
