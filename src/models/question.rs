use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Pending,
    Answered,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::Answered => "answered",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuestionStatus::Pending),
            "answered" => Ok(QuestionStatus::Answered),
            other => Err(format!("unknown question status: {}", other)),
        }
    }
}

/// A community question. `answer` is `None` exactly while `status` is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub user_name: String,
    pub user_id: String,
    pub is_anonymous: bool,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question: String,
    pub user_name: String,
    pub user_id: String,
    pub is_anonymous: bool,
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Inserts the question as pending with no answer.
    async fn create(&self, question: NewQuestion) -> Result<Uuid, AppError>;

    /// Moves a pending question to answered. Returns `false` when the
    /// question was not pending (already answered or unknown).
    async fn record_answer(&self, id: Uuid, answer: &str) -> Result<bool, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<PublicQuestion>, AppError>;

    /// The `limit` most recent questions, newest first.
    async fn latest(&self, limit: i64) -> Result<Vec<PublicQuestion>, AppError>;
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    question: String,
    answer: Option<String>,
    user_name: String,
    user_id: String,
    is_anonymous: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for PublicQuestion {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

        Ok(PublicQuestion {
            id: row.id,
            question: row.question,
            answer: row.answer,
            user_name: row.user_name,
            user_id: row.user_id,
            is_anonymous: row.is_anonymous,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgQuestionStore {
    pool: PgPool,
}

impl PgQuestionStore {
    pub fn new(pool: PgPool) -> Self {
        PgQuestionStore { pool }
    }
}

#[async_trait]
impl QuestionStore for PgQuestionStore {
    async fn create(&self, question: NewQuestion) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO public_questions (id, question, answer, user_name, user_id, is_anonymous, status)
            VALUES ($1, $2, NULL, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&question.question)
        .bind(&question.user_name)
        .bind(&question.user_id)
        .bind(question.is_anonymous)
        .bind(QuestionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        debug!(question_id = %id, user_id = %question.user_id, "Public question created");
        Ok(id)
    }

    async fn record_answer(&self, id: Uuid, answer: &str) -> Result<bool, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE public_questions
            SET answer = $2, status = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(answer)
        .bind(QuestionStatus::Answered.as_str())
        .bind(QuestionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            warn!(question_id = %id, "Answer ignored: question is not pending");
        }
        Ok(updated == 1)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PublicQuestion>, AppError> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question, answer, user_name, user_id, is_anonymous, status, created_at
            FROM public_questions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PublicQuestion::try_from).transpose()
    }

    async fn latest(&self, limit: i64) -> Result<Vec<PublicQuestion>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question, answer, user_name, user_id, is_anonymous, status, created_at
            FROM public_questions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PublicQuestion::try_from).collect()
    }
}
