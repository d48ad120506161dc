use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::ChatMessage;

#[derive(Deserialize, ToSchema)]
pub struct AskQuestionRequest {
    pub question: String,
    /// Answer before responding instead of in the background.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AskQuestionResponse {
    pub id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct ShareRequest {
    pub messages: Vec<ChatMessage>,
    /// Index of the user message; the reply must follow it.
    pub index: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ShareResponse {
    pub id: Uuid,
}

#[derive(Deserialize, IntoParams)]
pub struct LiveQuery {
    pub limit: Option<i64>,
}
