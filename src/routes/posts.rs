use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};

use crate::auth::Identity;
use crate::error::AppError;
use crate::types::{LiveQuery, ShareRequest, ShareResponse};
use crate::AppState;

use super::sse;

/// Shares one question/answer exchange from the caller's transcript.
#[post("/share")]
async fn share(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
    req_body: web::Json<ShareRequest>,
) -> Result<HttpResponse, AppError> {
    let id = app_state
        .orchestrator
        .share(&identity, &req_body.messages, req_body.index)
        .await?;
    Ok(HttpResponse::Created().json(ShareResponse { id }))
}

#[get("/live")]
async fn live_posts(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LiveQuery>,
) -> HttpResponse {
    sse(app_state.orchestrator.live_posts(query.limit))
}
