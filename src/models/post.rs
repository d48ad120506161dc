use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// A question/answer pair shared out of a private transcript.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub user_name: String,
    pub user_id: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub likes: i32,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub question: String,
    pub answer: String,
    pub user_name: String,
    pub user_id: String,
    pub is_anonymous: bool,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Uuid, AppError>;

    /// The `limit` most recent posts, newest first.
    async fn latest(&self, limit: i64) -> Result<Vec<Post>, AppError>;
}

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        PgPostStore { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create(&self, post: NewPost) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO posts (id, question, answer, user_name, user_id, is_anonymous, likes)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            "#,
        )
        .bind(id)
        .bind(&post.question)
        .bind(&post.answer)
        .bind(&post.user_name)
        .bind(&post.user_id)
        .bind(post.is_anonymous)
        .execute(&self.pool)
        .await?;

        debug!(post_id = %id, user_id = %post.user_id, "Post shared");
        Ok(id)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, question, answer, user_name, user_id, is_anonymous, created_at, likes
            FROM posts
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }
}
