use std::sync::Arc;

use actix_web::{delete, get, post, web, HttpResponse};

use crate::auth::Identity;
use crate::error::AppError;
use crate::models::ChatSession;
use crate::types::{DeleteAllResponse, SaveSessionRequest, SaveSessionResponse};
use crate::AppState;

#[get("")]
async fn list_sessions(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<web::Json<Vec<ChatSession>>, AppError> {
    let sessions = app_state.orchestrator.list_sessions(&identity).await?;
    Ok(web::Json(sessions))
}

#[post("")]
async fn save_session(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
    req_body: web::Json<SaveSessionRequest>,
) -> Result<HttpResponse, AppError> {
    let id = app_state
        .orchestrator
        .save_session(&identity, &req_body.messages)
        .await?;
    Ok(HttpResponse::Created().json(SaveSessionResponse { id }))
}

#[delete("")]
async fn delete_all_sessions(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<web::Json<DeleteAllResponse>, AppError> {
    let deleted = app_state.orchestrator.delete_all_sessions(&identity).await?;
    Ok(web::Json(DeleteAllResponse { deleted }))
}

#[delete("/{session_id}")]
async fn delete_session(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
    session_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    app_state
        .orchestrator
        .delete_session(&identity, &session_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
