use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{ChatMessage, Role};
use crate::prompts::Prompts;

/// Only the most recent prior turns are replayed to the model.
pub const MAX_PRIOR_TURNS: usize = 20;

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Generates one in-persona reply to `message`, with `prior_turns`
    /// (oldest first) as context.
    async fn complete(&self, message: &str, prior_turns: &[ChatMessage])
        -> Result<String, AppError>;
}

/// Rejects blank messages before anything reaches the provider.
pub fn validate_message(message: &str) -> Result<&str, AppError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("メッセージが必要です".to_string()));
    }
    Ok(trimmed)
}

/// Gateway to an OpenAI-compatible chat completion endpoint (Gemini by default).
pub struct OaiGateway {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OaiGateway {
    pub fn new(app_config: &AppConfig) -> Self {
        let oai_config = OpenAIConfig::new()
            .with_api_key(&app_config.gemini_api_key)
            .with_api_base(&app_config.gemini_api_base);

        OaiGateway {
            client: Client::with_config(oai_config),
            model: app_config.gemini_model.clone(),
            timeout: app_config.completion_timeout,
        }
    }

    fn build_request(&self, message: &str, prior_turns: &[ChatMessage]) -> CreateChatCompletionRequest {
        let recent = &prior_turns[prior_turns.len().saturating_sub(MAX_PRIOR_TURNS)..];

        let mut messages = Vec::with_capacity(recent.len() + 3);
        messages.push(user_message(Prompts::PERSONA));
        messages.push(assistant_message(Prompts::PERSONA_ACK));
        messages.extend(recent.iter().map(|turn| match turn.role {
            Role::User => user_message(&turn.content),
            Role::Assistant => assistant_message(&turn.content),
        }));
        messages.push(user_message(message));

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            ..Default::default()
        }
    }
}

fn user_message(text: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(text.to_string()),
        name: None,
    })
}

fn assistant_message(text: &str) -> ChatCompletionRequestMessage {
    #[allow(deprecated)]
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
            text.to_string(),
        )),
        refusal: None,
        name: None,
        audio: None,
        tool_calls: None,
        function_call: None,
    })
}

#[async_trait]
impl CompletionGateway for OaiGateway {
    async fn complete(
        &self,
        message: &str,
        prior_turns: &[ChatMessage],
    ) -> Result<String, AppError> {
        let message = validate_message(message)?;
        let request = self.build_request(message, prior_turns);

        info!(
            model = %self.model,
            prior_turns = prior_turns.len(),
            "Requesting chat completion"
        );

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                error!(timeout_secs = self.timeout.as_secs(), "Chat completion timed out");
                AppError::Upstream("request timed out".to_string())
            })?
            .map_err(|e| {
                error!("Chat completion failed: {:?}", e);
                AppError::Upstream(e.to_string())
            })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("empty response from model".to_string()))
    }
}
