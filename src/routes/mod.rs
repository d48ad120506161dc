pub mod auth;
pub mod chat;
pub mod posts;
pub mod questions;
pub mod sessions;

use actix_web::{web, Error, HttpResponse};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;

use crate::error::AppError;
use crate::feed::Subscription;

/// Registers every API route plus the JSON body config.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(chat::chat_completion)
        .service(chat::converse)
        .service(
            web::scope("/auth")
                .service(auth::anonymous)
                .service(auth::auth_callback)
                .service(auth::logout),
        )
        .service(
            web::scope("/user")
                .service(auth::get_user)
                .service(auth::update_display_name)
                .service(auth::get_terms)
                .service(auth::accept_terms),
        )
        .service(
            web::scope("/sessions")
                .service(sessions::list_sessions)
                .service(sessions::save_session)
                .service(sessions::delete_all_sessions)
                .service(sessions::delete_session),
        )
        .service(
            web::scope("/questions")
                .service(questions::ask_question)
                .service(questions::live_questions),
        )
        .service(
            web::scope("/posts")
                .service(posts::share)
                .service(posts::live_posts),
        );
}

/// Malformed or mistyped bodies are validation errors, rendered like any other.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

/// Streams each snapshot as one server-sent event. The subscription is
/// dropped (and so cancelled) when the client goes away.
fn sse<T>(subscription: Subscription<T>) -> HttpResponse
where
    T: Serialize + Send + 'static,
{
    let stream = subscription.into_stream().map(|snapshot| {
        serde_json::to_string(&snapshot)
            .map(|json| Bytes::from(format!("data: {}\n\n", json)))
            .map_err(|e| Error::from(AppError::Internal(e.into())))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}
