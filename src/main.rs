use std::sync::Arc;

use actix_cors::Cors;
use actix_web::web;
use anyhow::Context;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

mod auth;
mod config;
mod error;
mod feed;
mod middleware;
mod models;
mod oai;
mod orchestrator;
mod prompts;
mod routes;
#[cfg(test)]
mod testing;
mod types;

pub use config::AppConfig;

use auth::JwtKeys;
use feed::{PostFeed, QuestionFeed};
use middleware::auth::Authentication;
use models::{LocalStores, PgPostStore, PgProfileStore, PgQuestionStore, PgSessionStore};
use oai::OaiGateway;
use orchestrator::Orchestrator;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub keys: JwtKeys,
    pub config: AppConfig,
    pub http: reqwest::Client,
}

#[derive(OpenApi)]
#[openapi(
    info(title = "sokuresu"),
    components(schemas(
        models::ChatMessage,
        models::Role,
        models::ChatSession,
        models::PublicQuestion,
        models::QuestionStatus,
        models::Post,
        models::UserProfile,
        types::ErrorResponse,
        types::ChatCompletionRequest,
        types::ChatCompletionResponse,
        types::ConversationRequest,
        types::ConversationResponse,
        types::SaveSessionRequest,
        types::SaveSessionResponse,
        types::DeleteAllResponse,
        types::AskQuestionRequest,
        types::AskQuestionResponse,
        types::ShareRequest,
        types::ShareResponse,
        types::AuthResponse,
        types::UpdateDisplayNameRequest,
        types::TermsStatus,
    ))
)]
struct ApiDoc;

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secret_store: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let app_config = AppConfig::new(&secret_store)?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&app_config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations/cloud")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let orchestrator = Orchestrator::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        LocalStores::new(app_config.local_store_dir.clone()),
        Arc::new(PgProfileStore::new(pool.clone())),
        QuestionFeed::new(Arc::new(PgQuestionStore::new(pool.clone()))),
        PostFeed::new(Arc::new(PgPostStore::new(pool))),
        Arc::new(OaiGateway::new(&app_config)),
    );

    let app_state = Arc::new(AppState {
        orchestrator,
        keys: JwtKeys::new(app_config.jwt_secret.as_bytes()),
        config: app_config,
        http: reqwest::Client::new(),
    });

    info!(
        local_store_dir = %app_state.config.local_store_dir.display(),
        model = %app_state.config.gemini_model,
        "Starting sokuresu"
    );

    let config = move |cfg: &mut web::ServiceConfig| {
        cfg.service(Scalar::with_url("/scalar", ApiDoc::openapi()));
        cfg.service(
            web::scope("")
                .app_data(web::Data::new(app_state.clone()))
                .wrap(Authentication {
                    keys: app_state.keys.clone(),
                })
                .wrap(Cors::permissive())
                .configure(routes::configure),
        );
    };

    Ok(config.into())
}
