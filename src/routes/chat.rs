use std::sync::Arc;

use actix_web::{post, web};
use tracing::{error, info};

use crate::error::AppError;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, ConversationRequest, ConversationResponse,
};
use crate::AppState;

/// Stateless completion: one message plus the client's history in, one reply out.
#[post("/chat-completion")]
async fn chat_completion(
    app_state: web::Data<Arc<AppState>>,
    req_body: web::Json<ChatCompletionRequest>,
) -> Result<web::Json<ChatCompletionResponse>, AppError> {
    let request = req_body.into_inner();
    let message = request.message.unwrap_or_default();

    info!(history = request.history.len(), "Chat completion requested");

    let response = app_state
        .orchestrator
        .complete(&message, &request.history)
        .await
        .map_err(|e| {
            error!(error = %e, "Chat completion failed");
            e
        })?;

    Ok(web::Json(ChatCompletionResponse { response }))
}

/// Sends one message within a transcript. Provider failures become the
/// in-persona fallback reply instead of an error.
#[post("/conversation")]
async fn converse(
    app_state: web::Data<Arc<AppState>>,
    req_body: web::Json<ConversationRequest>,
) -> Result<web::Json<ConversationResponse>, AppError> {
    let request = req_body.into_inner();
    let mut conversation = app_state.orchestrator.conversation(request.messages);

    let reply = conversation.send(&request.message).await?.clone();
    info!(turns = conversation.transcript().len(), "Conversation advanced");

    Ok(web::Json(ConversationResponse {
        reply,
        messages: conversation.into_transcript(),
    }))
}
