use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ChatMessage;

#[derive(Deserialize, ToSchema)]
pub struct ChatCompletionRequest {
    /// Missing and blank messages are both rejected.
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatCompletionResponse {
    pub response: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ConversationRequest {
    pub message: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ConversationResponse {
    pub reply: ChatMessage,
    pub messages: Vec<ChatMessage>,
}
