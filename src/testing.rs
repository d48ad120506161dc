//! In-memory doubles for the Postgres stores and the model gateway.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{Identity, JwtKeys};
use crate::config::tests::test_config;
use crate::error::AppError;
use crate::feed::{PostFeed, QuestionFeed};
use crate::models::message::ensure_non_empty;
use crate::models::{
    ChatMessage, ChatSession, CloudSessions, LocalStores, NewPost, NewQuestion, Post, PostStore,
    ProfileDefaults, ProfileStore, PublicQuestion, QuestionStatus, QuestionStore, UserProfile,
};
use crate::oai::{validate_message, CompletionGateway};
use crate::orchestrator::Orchestrator;
use crate::prompts::Prompts;
use crate::AppState;

#[derive(Default)]
pub struct MemoryCloudSessions {
    // (account, session) in insertion order
    sessions: Mutex<Vec<(String, ChatSession)>>,
}

#[async_trait]
impl CloudSessions for MemoryCloudSessions {
    async fn save(&self, account_id: &str, messages: &[ChatMessage]) -> Result<String, AppError> {
        ensure_non_empty(messages)?;
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            messages: messages.to_vec(),
            created_at: Utc::now(),
        };
        let id = session.id.clone();
        self.sessions
            .lock()
            .unwrap()
            .push((account_id.to_string(), session));
        Ok(id)
    }

    async fn list_for_account(&self, account_id: &str) -> Result<Vec<ChatSession>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(owner, _)| owner == account_id)
            .map(|(_, session)| session.clone())
            .collect())
    }

    async fn delete_one(&self, account_id: &str, id: &str) -> Result<(), AppError> {
        self.sessions
            .lock()
            .unwrap()
            .retain(|(owner, session)| !(owner == account_id && session.id == id));
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: &str) -> Result<u64, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|(owner, _)| owner != account_id);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryQuestionStore {
    questions: Mutex<Vec<PublicQuestion>>,
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn create(&self, question: NewQuestion) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        self.questions.lock().unwrap().push(PublicQuestion {
            id,
            question: question.question,
            answer: None,
            user_name: question.user_name,
            user_id: question.user_id,
            is_anonymous: question.is_anonymous,
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn record_answer(&self, id: Uuid, answer: &str) -> Result<bool, AppError> {
        let mut questions = self.questions.lock().unwrap();
        match questions
            .iter_mut()
            .find(|q| q.id == id && q.status == QuestionStatus::Pending)
        {
            Some(question) => {
                question.answer = Some(answer.to_string());
                question.status = QuestionStatus::Answered;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<PublicQuestion>, AppError> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.id == id)
            .cloned())
    }

    async fn latest(&self, limit: i64) -> Result<Vec<PublicQuestion>, AppError> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<Vec<Post>>,
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, post: NewPost) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        self.posts.lock().unwrap().push(Post {
            id,
            question: post.question,
            answer: post.answer,
            user_name: post.user_name,
            user_id: post.user_id,
            is_anonymous: post.is_anonymous,
            created_at: Utc::now(),
            likes: 0,
        });
        Ok(id)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Post>, AppError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        Ok(self.profiles.lock().unwrap().get(uid).cloned())
    }

    async fn get_or_create(
        &self,
        uid: &str,
        defaults: ProfileDefaults,
    ) -> Result<UserProfile, AppError> {
        let now = Utc::now();
        let profile = self
            .profiles
            .lock()
            .unwrap()
            .entry(uid.to_string())
            .or_insert_with(|| UserProfile {
                uid: uid.to_string(),
                display_name: defaults
                    .display_name
                    .unwrap_or_else(|| Prompts::DEFAULT_DISPLAY_NAME.to_string()),
                email: defaults.email,
                is_anonymous: false,
                custom_display_name: None,
                accepted_terms_version: None,
                created_at: Some(now),
                updated_at: Some(now),
            })
            .clone();
        Ok(profile)
    }

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<UserProfile, AppError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound(format!("profile {}", uid)))?;
        profile.custom_display_name = Some(name.to_string());
        profile.updated_at = Some(Utc::now());
        Ok(profile.clone())
    }

    async fn set_accepted_terms(&self, uid: &str, version: &str) -> Result<(), AppError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound(format!("profile {}", uid)))?;
        profile.accepted_terms_version = Some(version.to_string());
        Ok(())
    }
}

/// Replies from a script, then echoes. Records every call it receives.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, String>>>,
    delay: Duration,
    pub calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedGateway {
    pub fn replying(replies: Vec<Result<&str, &str>>) -> Self {
        ScriptedGateway {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every reply takes `delay` to arrive.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        message: &str,
        prior_turns: &[ChatMessage],
    ) -> Result<String, AppError> {
        let message = validate_message(message)?;
        self.calls
            .lock()
            .unwrap()
            .push((message.to_string(), prior_turns.to_vec()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(AppError::Upstream(reason)),
            None => Ok(format!("echo: {}", message)),
        }
    }
}

/// Application state over in-memory stores and a temporary local-store root.
pub struct TestState {
    _dir: tempfile::TempDir,
    pub gateway: Arc<ScriptedGateway>,
    pub app_state: Arc<AppState>,
}

impl TestState {
    pub fn new(gateway: ScriptedGateway) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(gateway);
        let config = test_config();

        let orchestrator = Orchestrator::new(
            Arc::new(MemoryCloudSessions::default()),
            LocalStores::new(dir.path()),
            Arc::new(MemoryProfileStore::default()),
            QuestionFeed::new(Arc::new(MemoryQuestionStore::default())),
            PostFeed::new(Arc::new(MemoryPostStore::default())),
            gateway.clone(),
        );

        let app_state = Arc::new(AppState {
            orchestrator,
            keys: JwtKeys::new(config.jwt_secret.as_bytes()),
            config,
            http: reqwest::Client::new(),
        });

        TestState {
            _dir: dir,
            gateway,
            app_state,
        }
    }

    /// `Authorization` header value for `identity`.
    pub fn bearer(&self, identity: &Identity) -> (&'static str, String) {
        let token = self.app_state.keys.sign(identity).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }
}

/// Initializes the full route tree behind the authentication middleware.
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.app_state.clone()))
                .wrap(crate::middleware::auth::Authentication {
                    keys: $state.app_state.keys.clone(),
                })
                .configure(crate::routes::configure),
        )
        .await
    };
}
pub(crate) use test_app;
