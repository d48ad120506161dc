use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use moka::future::Cache;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::message::{ensure_non_empty, ChatMessage};
use crate::models::session::{ChatSession, SessionStore};

const TERMS_KEY: &str = "terms_accepted";
const ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Device-scoped history for an anonymous identity, kept in its own SQLite file.
#[derive(Clone)]
pub struct LocalSessionStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct LocalSessionRow {
    id: String,
    messages: Json<Vec<ChatMessage>>,
    created_at: i64,
}

impl From<LocalSessionRow> for ChatSession {
    fn from(row: LocalSessionRow) -> Self {
        ChatSession {
            id: row.id,
            messages: row.messages.0,
            created_at: Utc
                .timestamp_millis_opt(row.created_at)
                .single()
                .unwrap_or_default(),
        }
    }
}

impl LocalSessionStore {
    /// Opens (creating if needed) the store at `path`.
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        sqlx::migrate!("./migrations/local")
            .run(&pool)
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        Ok(LocalSessionStore { pool })
    }

    pub async fn accepted_terms(&self) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(TERMS_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_accepted_terms(&self, version: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(TERMS_KEY)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// `local_<unix millis>_<7 base-36 chars>`; the suffix separates saves made
/// within the same millisecond.
fn local_session_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("local_{}_{}", now.timestamp_millis(), suffix)
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn save(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        ensure_non_empty(messages)?;

        let now = Utc::now();
        let id = local_session_id(now);
        sqlx::query("INSERT INTO chat_sessions (id, messages, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(Json(messages.to_vec()))
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        debug!(session_id = %id, "Local chat session saved");
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ChatSession>, AppError> {
        // Walks chat_sessions_created_at backwards; rowid breaks same-millisecond ties.
        let rows = sqlx::query_as::<_, LocalSessionRow>(
            r#"
            SELECT id, messages, created_at FROM chat_sessions
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatSession::from).collect())
    }

    async fn delete_one(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let deleted = sqlx::query("DELETE FROM chat_sessions")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

/// Opens and caches one [`LocalSessionStore`] per anonymous identity.
#[derive(Clone)]
pub struct LocalStores {
    root: PathBuf,
    open: Cache<String, LocalSessionStore>,
}

impl LocalStores {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let open = Cache::builder()
            .max_capacity(1_000)
            .time_to_idle(Duration::from_secs(15 * 60))
            .build();

        LocalStores {
            root: root.into(),
            open,
        }
    }

    fn path_for(&self, uid: &str) -> Result<PathBuf, AppError> {
        let valid = !uid.is_empty()
            && uid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::StorageUnavailable(format!(
                "identity {:?} cannot name a local store",
                uid
            )));
        }
        Ok(self.root.join(format!("{}.sqlite", uid)))
    }

    pub async fn for_identity(&self, uid: &str) -> Result<LocalSessionStore, AppError> {
        let path = self.path_for(uid)?;
        let root = self.root.clone();

        self.open
            .try_get_with(uid.to_string(), async move {
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
                LocalSessionStore::open(&path).await
            })
            .await
            .map_err(|e| {
                warn!(user_id = uid, error = %e, "Failed to open local session store");
                AppError::StorageUnavailable(e.to_string())
            })
    }

    /// Wipes everything the identity stored locally. Anonymous identities are
    /// single-use, so nothing here is recoverable afterwards.
    pub async fn destroy(&self, uid: &str) -> Result<(), AppError> {
        let path = self.path_for(uid)?;

        if let Some(store) = self.open.remove(uid).await {
            store.delete_all().await?;
            store.close().await;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::StorageUnavailable(e.to_string())),
        }

        info!(user_id = uid, "Local session store destroyed");
        Ok(())
    }
}
