//! Application policy: which history store an identity gets, how chat turns
//! reach the model, and the public question lifecycle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::AppError;
use crate::feed::{PostFeed, QuestionFeed, Subscription};
use crate::models::{
    AccountSessions, ChatMessage, ChatSession, CloudSessions, LocalStores, NewPost, NewQuestion,
    Post, ProfileDefaults, ProfileStore, PublicQuestion, Role, SessionStore, UserProfile,
    TERMS_VERSION,
};
use crate::oai::{validate_message, CompletionGateway};
use crate::prompts::Prompts;

#[derive(Clone)]
pub struct Orchestrator {
    cloud_sessions: Arc<dyn CloudSessions>,
    local_stores: LocalStores,
    profiles: Arc<dyn ProfileStore>,
    questions: QuestionFeed,
    posts: PostFeed,
    gateway: Arc<dyn CompletionGateway>,
}

impl Orchestrator {
    pub fn new(
        cloud_sessions: Arc<dyn CloudSessions>,
        local_stores: LocalStores,
        profiles: Arc<dyn ProfileStore>,
        questions: QuestionFeed,
        posts: PostFeed,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Self {
        Orchestrator {
            cloud_sessions,
            local_stores,
            profiles,
            questions,
            posts,
            gateway,
        }
    }

    /// The one history store for this identity: its device store when
    /// anonymous, its account in the cloud otherwise.
    pub async fn session_store(
        &self,
        identity: &Identity,
    ) -> Result<Box<dyn SessionStore>, AppError> {
        if identity.is_anonymous {
            Ok(Box::new(self.local_stores.for_identity(&identity.uid).await?))
        } else {
            Ok(Box::new(AccountSessions::new(
                self.cloud_sessions.clone(),
                &identity.uid,
            )))
        }
    }

    pub async fn save_session(
        &self,
        identity: &Identity,
        messages: &[ChatMessage],
    ) -> Result<String, AppError> {
        let id = self.session_store(identity).await?.save(messages).await?;
        info!(
            user_id = %identity.uid,
            session_id = %id,
            anonymous = identity.is_anonymous,
            "Session saved"
        );
        Ok(id)
    }

    pub async fn list_sessions(&self, identity: &Identity) -> Result<Vec<ChatSession>, AppError> {
        self.session_store(identity).await?.list().await
    }

    pub async fn delete_session(&self, identity: &Identity, id: &str) -> Result<(), AppError> {
        self.session_store(identity).await?.delete_one(id).await
    }

    pub async fn delete_all_sessions(&self, identity: &Identity) -> Result<u64, AppError> {
        let deleted = self.session_store(identity).await?.delete_all().await?;
        info!(user_id = %identity.uid, deleted, "Session history cleared");
        Ok(deleted)
    }

    /// Anonymous identities are single-use, so their device history goes with
    /// them. Persistent accounts keep everything.
    pub async fn sign_out(&self, identity: &Identity) -> Result<(), AppError> {
        if identity.is_anonymous {
            self.local_stores.destroy(&identity.uid).await?;
        }
        info!(user_id = %identity.uid, anonymous = identity.is_anonymous, "Signed out");
        Ok(())
    }

    /// One stateless completion. Errors are returned to the caller untouched.
    pub async fn complete(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String, AppError> {
        self.gateway.complete(message, history).await
    }

    /// Picks up an in-memory transcript where the client left it.
    pub fn conversation(&self, transcript: Vec<ChatMessage>) -> Conversation {
        Conversation::resume(self.gateway.clone(), transcript)
    }

    pub async fn profile(&self, identity: &Identity) -> Result<UserProfile, AppError> {
        if identity.is_anonymous {
            return Ok(UserProfile::anonymous(&identity.uid));
        }

        let defaults = ProfileDefaults {
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
        };
        self.profiles.get_or_create(&identity.uid, defaults).await
    }

    pub async fn rename(&self, identity: &Identity, name: &str) -> Result<UserProfile, AppError> {
        if identity.is_anonymous {
            return Err(AppError::Forbidden(
                "anonymous users cannot change their display name".to_string(),
            ));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("表示名が必要です".to_string()));
        }

        // The row may not exist yet if this account never fetched its profile.
        self.profile(identity).await?;
        let profile = self.profiles.update_display_name(&identity.uid, name).await?;
        info!(user_id = %identity.uid, "Display name updated");
        Ok(profile)
    }

    pub async fn accept_terms(&self, identity: &Identity) -> Result<(), AppError> {
        if identity.is_anonymous {
            self.local_stores
                .for_identity(&identity.uid)
                .await?
                .set_accepted_terms(TERMS_VERSION)
                .await?;
        } else {
            self.profile(identity).await?;
            self.profiles
                .set_accepted_terms(&identity.uid, TERMS_VERSION)
                .await?;
        }
        info!(user_id = %identity.uid, version = TERMS_VERSION, "Terms accepted");
        Ok(())
    }

    pub async fn has_accepted_terms(&self, identity: &Identity) -> Result<bool, AppError> {
        let accepted = if identity.is_anonymous {
            self.local_stores
                .for_identity(&identity.uid)
                .await?
                .accepted_terms()
                .await?
        } else {
            self.profiles
                .get(&identity.uid)
                .await?
                .and_then(|profile| profile.accepted_terms_version)
        };
        Ok(accepted.as_deref() == Some(TERMS_VERSION))
    }

    /// Records the question as pending and returns its id; the answer is
    /// generated in the background and lands on the live feed.
    pub async fn submit_public_question(
        &self,
        identity: &Identity,
        question: &str,
    ) -> Result<Uuid, AppError> {
        let (id, question) = self.create_public_question(identity, question).await?;
        self.spawn_answer(id, question);
        Ok(id)
    }

    /// Like [`Self::submit_public_question`] but waits for the answer. The
    /// answer still runs on its own task, so dropping this future never
    /// leaves the question pending.
    pub async fn ask_public(
        &self,
        identity: &Identity,
        question: &str,
    ) -> Result<PublicQuestion, AppError> {
        let (id, question) = self.create_public_question(identity, question).await?;

        self.spawn_answer(id, question)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("answer task failed: {}", e)))??;

        self.questions
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("question {}", id)))
    }

    fn spawn_answer(&self, id: Uuid, question: String) -> JoinHandle<Result<(), AppError>> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let result = orchestrator.answer_question(id, &question).await;
            if let Err(e) = &result {
                error!(question_id = %id, error = %e, "Failed to record answer");
            }
            result
        })
    }

    async fn create_public_question(
        &self,
        identity: &Identity,
        question: &str,
    ) -> Result<(Uuid, String), AppError> {
        let question = validate_message(question)?.to_string();
        let profile = self.profile(identity).await?;

        let id = self
            .questions
            .create(NewQuestion {
                question: question.clone(),
                user_name: profile.resolved_display_name(),
                user_id: identity.uid.clone(),
                is_anonymous: identity.is_anonymous,
            })
            .await?;

        info!(question_id = %id, user_id = %identity.uid, "Public question created");
        Ok((id, question))
    }

    /// Generates the answer to `question` with no prior context and records
    /// it. Gateway failures still resolve the question, with the fallback text.
    pub async fn answer_question(&self, id: Uuid, question: &str) -> Result<(), AppError> {
        let answer = match self.gateway.complete(question, &[]).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(question_id = %id, error = %e, "Answer generation failed, using fallback");
                Prompts::PUBLIC_ANSWER_FALLBACK.to_string()
            }
        };

        if !self.questions.record_answer(id, &answer).await? {
            warn!(question_id = %id, "Question was already answered");
        }
        Ok(())
    }

    pub fn live_questions(&self, limit: Option<i64>) -> Subscription<PublicQuestion> {
        self.questions.subscribe(limit)
    }

    /// Publishes the user message at `index` together with the assistant
    /// reply that follows it.
    pub async fn share(
        &self,
        identity: &Identity,
        transcript: &[ChatMessage],
        index: usize,
    ) -> Result<Uuid, AppError> {
        let (question, answer) = exchange_at(transcript, index)?;
        let profile = self.profile(identity).await?;

        let id = self
            .posts
            .create(NewPost {
                question: question.content.clone(),
                answer: answer.content.clone(),
                user_name: profile.resolved_display_name(),
                user_id: identity.uid.clone(),
                is_anonymous: identity.is_anonymous,
            })
            .await?;

        info!(post_id = %id, user_id = %identity.uid, "Exchange shared");
        Ok(id)
    }

    pub fn live_posts(&self, limit: Option<i64>) -> Subscription<Post> {
        self.posts.subscribe(limit)
    }
}

fn exchange_at(
    transcript: &[ChatMessage],
    index: usize,
) -> Result<(&ChatMessage, &ChatMessage), AppError> {
    let next = index.checked_add(1).and_then(|i| transcript.get(i));
    match (transcript.get(index), next) {
        (Some(question), Some(answer))
            if question.role == Role::User && answer.role == Role::Assistant =>
        {
            Ok((question, answer))
        }
        _ => Err(AppError::Validation(format!(
            "no question and answer pair at index {}",
            index
        ))),
    }
}

/// An in-memory transcript. A failed send never loses earlier turns.
pub struct Conversation {
    gateway: Arc<dyn CompletionGateway>,
    transcript: Vec<ChatMessage>,
}

impl Conversation {
    pub fn resume(gateway: Arc<dyn CompletionGateway>, transcript: Vec<ChatMessage>) -> Self {
        Conversation {
            gateway,
            transcript,
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn into_transcript(self) -> Vec<ChatMessage> {
        self.transcript
    }

    /// Appends the user turn and the reply (or the fallback reply). Only
    /// blank input is rejected, and it leaves the transcript untouched.
    pub async fn send(&mut self, message: &str) -> Result<&ChatMessage, AppError> {
        let message = validate_message(message)?.to_string();

        let reply = match self.gateway.complete(&message, &self.transcript).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Chat completion failed, using fallback");
                Prompts::CHAT_FALLBACK.to_string()
            }
        };

        self.transcript.push(ChatMessage::user(message));
        self.transcript.push(ChatMessage::assistant(reply));
        Ok(&self.transcript[self.transcript.len() - 1])
    }
}
