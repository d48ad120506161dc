use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};

use crate::auth::Identity;
use crate::error::AppError;
use crate::types::{AskQuestionRequest, AskQuestionResponse, LiveQuery};
use crate::AppState;

use super::sse;

/// Posts a public question. By default the question is accepted as pending
/// and answered in the background; `wait` answers it before responding.
#[post("")]
async fn ask_question(
    app_state: web::Data<Arc<AppState>>,
    identity: Identity,
    req_body: web::Json<AskQuestionRequest>,
) -> Result<HttpResponse, AppError> {
    let orchestrator = &app_state.orchestrator;

    if req_body.wait {
        let question = orchestrator
            .ask_public(&identity, &req_body.question)
            .await?;
        return Ok(HttpResponse::Ok().json(question));
    }

    let id = orchestrator
        .submit_public_question(&identity, &req_body.question)
        .await?;
    Ok(HttpResponse::Accepted().json(AskQuestionResponse { id }))
}

/// Newest-first snapshots of the board, pushed on every change.
#[get("/live")]
async fn live_questions(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LiveQuery>,
) -> HttpResponse {
    sse(app_state.orchestrator.live_questions(query.limit))
}

#[cfg(test)]
mod tests {
    use actix_web::body::MessageBody;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use futures::future::poll_fn;
    use serde_json::{json, Value};
    use std::time::Duration;

    use crate::auth::Identity;
    use crate::models::{PublicQuestion, QuestionStatus};
    use crate::testing::{test_app, ScriptedGateway, TestState};
    use crate::types::AskQuestionResponse;

    #[actix_web::test]
    async fn waiting_returns_the_answered_question() {
        let state = TestState::new(ScriptedGateway::replying(vec![Ok("A1")]));
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/questions")
            .insert_header(state.bearer(&Identity::new_anonymous()))
            .set_json(json!({"question": "Q1", "wait": true}))
            .to_request();
        let question: PublicQuestion = test::call_and_read_body_json(&app, req).await;

        assert_eq!(question.question, "Q1");
        assert_eq!(question.answer.as_deref(), Some("A1"));
        assert_eq!(question.status, QuestionStatus::Answered);
        assert!(question.is_anonymous);
    }

    #[actix_web::test]
    async fn questions_are_accepted_then_answered_on_the_live_feed() {
        let state = TestState::new(ScriptedGateway::replying(vec![Ok("A1")]));
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/questions")
            .insert_header(state.bearer(&Identity::persistent("acct_taro", None, None)))
            .set_json(json!({"question": "Q1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let accepted: AskQuestionResponse = test::read_body_json(resp).await;

        let req = test::TestRequest::get()
            .uri("/questions/live?limit=10")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let mut body = Box::pin(resp.into_body());
        let answered = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let chunk = poll_fn(|cx| body.as_mut().poll_next(cx))
                    .await
                    .unwrap()
                    .unwrap();
                let text = String::from_utf8(chunk.to_vec()).unwrap();
                let json = text.strip_prefix("data: ").unwrap().trim_end();
                let snapshot: Vec<Value> = serde_json::from_str(json).unwrap();
                if snapshot[0]["status"] == "answered" {
                    break snapshot;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0]["id"], accepted.id.to_string());
        assert_eq!(answered[0]["answer"], "A1");
        assert_eq!(answered[0]["userId"], "acct_taro");
    }

    #[actix_web::test]
    async fn posting_requires_an_identity() {
        let state = TestState::new(ScriptedGateway::default());
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/questions")
            .set_json(json!({"question": "Q1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.gateway.call_count(), 0);
    }
}
