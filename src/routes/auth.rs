use std::sync::Arc;

use actix_web::{get, post, put, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::Identity;
use crate::error::AppError;
use crate::models::{UserProfile, TERMS_VERSION};
use crate::types::{AuthCallbackQuery, AuthResponse, TermsStatus, UpdateDisplayNameRequest};
use crate::{AppConfig, AppState};

const WORKOS_AUTHENTICATE_URL: &str = "https://api.workos.com/user_management/authenticate";

#[derive(Deserialize, Debug)]
struct WorkOSUser {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl WorkOSUser {
    fn display_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

// For the request payload
#[derive(Serialize)]
struct WorkOSAuthRequest {
    client_id: String,
    client_secret: String,
    grant_type: String,
    code: String,
}

#[derive(Deserialize)]
struct WorkOSAuthResponse {
    user: WorkOSUser,
}

/// Starts a single-use anonymous identity. Its history lives only in its
/// device store.
#[post("/anonymous")]
async fn anonymous(
    app_state: web::Data<Arc<AppState>>,
) -> Result<web::Json<AuthResponse>, AppError> {
    let identity = Identity::new_anonymous();
    let token = app_state.keys.sign(&identity)?;
    let profile = app_state.orchestrator.profile(&identity).await?;

    info!(user_id = %identity.uid, "Anonymous identity issued");
    Ok(web::Json(AuthResponse { token, profile }))
}

#[get("/workos/callback")]
async fn auth_callback(
    app_state: web::Data<Arc<AppState>>,
    info: web::Query<AuthCallbackQuery>,
) -> Result<impl Responder, AppError> {
    // Exchange the code for user information using the WorkOS API
    let user = exchange_code_for_user(&app_state.http, &info.code, &app_state.config).await?;
    let identity = Identity::persistent(&user.id, user.display_name(), user.email.clone());

    // First sign-in creates the profile
    app_state.orchestrator.profile(&identity).await?;
    let token = app_state.keys.sign(&identity)?;

    info!(user_id = %identity.uid, "Persistent sign-in completed");
    let redirect_url = format!("{}/auth/callback?token={}", app_state.config.client_url, token);
    Ok(web::Redirect::to(redirect_url))
}

#[post("/logout")]
async fn logout(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    app_state.orchestrator.sign_out(&identity).await?;
    app_state.keys.retire(&identity).await;
    Ok(HttpResponse::NoContent().finish())
}

#[get("")]
async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<web::Json<UserProfile>, AppError> {
    let profile = app_state.orchestrator.profile(&identity).await?;
    Ok(web::Json(profile))
}

#[put("/display-name")]
async fn update_display_name(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
    req_body: web::Json<UpdateDisplayNameRequest>,
) -> Result<web::Json<UserProfile>, AppError> {
    let profile = app_state
        .orchestrator
        .rename(&identity, &req_body.name)
        .await?;
    Ok(web::Json(profile))
}

#[get("/terms")]
async fn get_terms(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<web::Json<TermsStatus>, AppError> {
    let accepted = app_state.orchestrator.has_accepted_terms(&identity).await?;
    Ok(web::Json(TermsStatus {
        version: TERMS_VERSION.to_string(),
        accepted,
    }))
}

#[post("/terms")]
async fn accept_terms(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
) -> Result<web::Json<TermsStatus>, AppError> {
    app_state.orchestrator.accept_terms(&identity).await?;
    Ok(web::Json(TermsStatus {
        version: TERMS_VERSION.to_string(),
        accepted: true,
    }))
}

async fn exchange_code_for_user(
    client: &reqwest::Client,
    code: &str,
    app_config: &AppConfig,
) -> Result<WorkOSUser, AppError> {
    let resp = client
        .post(WORKOS_AUTHENTICATE_URL)
        .bearer_auth(&app_config.workos_api_key)
        .json(&WorkOSAuthRequest {
            client_id: app_config.workos_client_id.clone(),
            client_secret: app_config.workos_api_key.clone(),
            grant_type: "authorization_code".to_owned(),
            code: code.to_owned(),
        })
        .send()
        .await
        .map_err(|e| {
            error!("HTTP request error: {}", e);
            AppError::Auth("sign-in failed".to_string())
        })?;

    if !resp.status().is_success() {
        // Attempt to read the response body for error details
        let error_body = resp
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("Error response from WorkOS: {}", error_body);
        return Err(AppError::Auth("sign-in failed".to_string()));
    }

    let auth_response = resp.json::<WorkOSAuthResponse>().await.map_err(|e| {
        error!("Malformed response from WorkOS: {}", e);
        AppError::Auth("sign-in failed".to_string())
    })?;
    Ok(auth_response.user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;
    use serde_json::json;

    use crate::prompts::Prompts;
    use crate::testing::{test_app, ScriptedGateway, TestState};

    fn workos_user(first: Option<&str>, last: Option<&str>) -> WorkOSUser {
        WorkOSUser {
            id: "user_01".to_string(),
            email: None,
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
        }
    }

    #[test]
    fn display_name_joins_present_parts() {
        assert_eq!(
            workos_user(Some("Taro"), Some("Yamada")).display_name().as_deref(),
            Some("Taro Yamada")
        );
        assert_eq!(
            workos_user(None, Some("Yamada")).display_name().as_deref(),
            Some("Yamada")
        );
        assert_eq!(workos_user(Some(" "), None).display_name(), None);
    }

    #[actix_web::test]
    async fn anonymous_tokens_authenticate_later_requests() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);

        let req = actix_test::TestRequest::post().uri("/auth/anonymous").to_request();
        let auth: AuthResponse = actix_test::call_and_read_body_json(&app, req).await;
        assert!(auth.profile.is_anonymous);
        assert_eq!(auth.profile.display_name, Prompts::ANONYMOUS_DISPLAY_NAME);

        let req = actix_test::TestRequest::get()
            .uri("/user")
            .insert_header(("Authorization", format!("Bearer {}", auth.token)))
            .to_request();
        let profile: UserProfile = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile.uid, auth.profile.uid);
    }

    #[actix_web::test]
    async fn anonymous_rename_is_forbidden() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);

        let req = actix_test::TestRequest::put()
            .uri("/user/display-name")
            .insert_header(state.bearer(&Identity::new_anonymous()))
            .set_json(json!({"name": "新しい名前"}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn persistent_rename_and_terms() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);
        let auth = state.bearer(&Identity::persistent("acct_taro", Some("Taro".into()), None));

        let req = actix_test::TestRequest::put()
            .uri("/user/display-name")
            .insert_header(auth.clone())
            .set_json(json!({"name": "たろう"}))
            .to_request();
        let profile: UserProfile = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile.custom_display_name.as_deref(), Some("たろう"));

        let req = actix_test::TestRequest::get()
            .uri("/user/terms")
            .insert_header(auth.clone())
            .to_request();
        let status: TermsStatus = actix_test::call_and_read_body_json(&app, req).await;
        assert!(!status.accepted);

        let req = actix_test::TestRequest::post()
            .uri("/user/terms")
            .insert_header(auth.clone())
            .to_request();
        actix_test::call_service(&app, req).await;

        let req = actix_test::TestRequest::get()
            .uri("/user/terms")
            .insert_header(auth)
            .to_request();
        let status: TermsStatus = actix_test::call_and_read_body_json(&app, req).await;
        assert!(status.accepted);
        assert_eq!(status.version, TERMS_VERSION);
    }

    #[actix_web::test]
    async fn anonymous_logout_wipes_history_and_retires_the_token() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);
        let anon = Identity::new_anonymous();
        let auth = state.bearer(&anon);

        let req = actix_test::TestRequest::post()
            .uri("/sessions")
            .insert_header(auth.clone())
            .set_json(json!({"messages": [{"role": "user", "content": "hi"}]}))
            .to_request();
        actix_test::call_service(&app, req).await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/logout")
            .insert_header(auth.clone())
            .to_request();
        assert_eq!(
            actix_test::call_service(&app, req).await.status(),
            StatusCode::NO_CONTENT
        );

        let req = actix_test::TestRequest::get()
            .uri("/sessions")
            .insert_header(auth)
            .to_request();
        assert_eq!(
            actix_test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let sessions = state.app_state.orchestrator.list_sessions(&anon).await.unwrap();
        assert!(sessions.is_empty());
    }

    #[actix_web::test]
    async fn persistent_logout_keeps_the_account_usable() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);
        let auth = state.bearer(&Identity::persistent("acct_taro", None, None));

        let req = actix_test::TestRequest::post()
            .uri("/auth/logout")
            .insert_header(auth.clone())
            .to_request();
        actix_test::call_service(&app, req).await;

        let req = actix_test::TestRequest::get()
            .uri("/sessions")
            .insert_header(auth)
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
