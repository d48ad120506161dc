use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::prompts::Prompts;

/// Version of the terms of service a user must have accepted.
pub const TERMS_VERSION: &str = "2025.01";

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
    pub custom_display_name: Option<String>,
    pub accepted_terms_version: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Stand-in for anonymous identities. Never persisted.
    pub fn anonymous(uid: &str) -> Self {
        UserProfile {
            uid: uid.to_string(),
            display_name: Prompts::ANONYMOUS_DISPLAY_NAME.to_string(),
            email: None,
            is_anonymous: true,
            custom_display_name: None,
            accepted_terms_version: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// The name shown on anything this user publishes.
    pub fn resolved_display_name(&self) -> String {
        if self.is_anonymous {
            return Prompts::ANONYMOUS_DISPLAY_NAME.to_string();
        }
        let non_blank = |name: &&str| !name.trim().is_empty();
        self.custom_display_name
            .as_deref()
            .filter(non_blank)
            .or(Some(self.display_name.as_str()).filter(non_blank))
            .unwrap_or(Prompts::DEFAULT_DISPLAY_NAME)
            .to_string()
    }
}

/// Values used when a profile is created on first sign-in.
#[derive(Debug, Clone, Default)]
pub struct ProfileDefaults {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, AppError>;

    /// Returns the stored profile, creating it from `defaults` when absent.
    async fn get_or_create(
        &self,
        uid: &str,
        defaults: ProfileDefaults,
    ) -> Result<UserProfile, AppError>;

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<UserProfile, AppError>;

    async fn set_accepted_terms(&self, uid: &str, version: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        PgProfileStore { pool }
    }
}

const PROFILE_COLUMNS: &str = "uid, display_name, email, is_anonymous, custom_display_name, accepted_terms_version, created_at, updated_at";

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE uid = $1",
            PROFILE_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn get_or_create(
        &self,
        uid: &str,
        defaults: ProfileDefaults,
    ) -> Result<UserProfile, AppError> {
        let display_name = defaults
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| Prompts::DEFAULT_DISPLAY_NAME.to_string());

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_profiles (uid, display_name, email, is_anonymous)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(uid)
        .bind(&display_name)
        .bind(&defaults.email)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            info!(user_id = uid, "Created user profile");
        }

        // Re-read so server-assigned timestamps are returned.
        self.get(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", uid)))
    }

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<UserProfile, AppError> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE user_profiles
            SET custom_display_name = $2, updated_at = clock_timestamp()
            WHERE uid = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(uid)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {}", uid)))?;

        debug!(user_id = uid, "Display name updated");
        Ok(profile)
    }

    async fn set_accepted_terms(&self, uid: &str, version: &str) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE user_profiles
            SET accepted_terms_version = $2, updated_at = clock_timestamp()
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .bind(version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound(format!("profile {}", uid)));
        }
        Ok(())
    }
}
