//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use hirepipe::api::{AppState, router};
use hirepipe::pipeline::Pipeline;
use hirepipe::storage::{CandidateStore, MemoryStore};

const BOUNDARY: &str = "hirepipe-test-boundary";

fn build_app(debug_endpoints: bool) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::builder(store.clone())
        .public_url("http://hire.test")
        .build();
    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        debug_endpoints,
    });
    (router(state, 1024 * 1024), store)
}

fn multipart(fields: &[(&str, &str)], resume: Option<(&str, &str)>) -> Body {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((filename, contents)) = resume {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn apply_request(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/form")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Apply through the form and return the new candidate's token.
async fn apply(app: &Router, store: &MemoryStore) -> String {
    let body = multipart(
        &[("name", "Ada Lovelace"), ("email", "ada@example.com"), ("skills", "Python, SQL")],
        Some(("resume.txt", "Python developer with five years of experience")),
    );
    let resp = app.clone().oneshot(apply_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "shortlisted");
    assert!(json.get("token").is_none(), "token is only sent by email");

    let records = store.all().await.unwrap();
    assert_eq!(records.len(), 1);
    records.into_keys().next().unwrap()
}

const CODE: &str = "code=def+add(a%2C+b)%3A%0A++++return+a+%2B+b&language=python";
const TECH: &str = "answer=A+list+is+mutable+and+can+change%2C+while+a+tuple+is+immutable+and+fixed+once+created.";
const HR: &str = "answer=During+a+difficult+release+our+team+hit+a+blocking+bug.+I+organised+a+short+war+room%2C+\
we+agreed+on+a+solution+together+and+shipped+on+time.";

#[tokio::test]
async fn health_reports_version() {
    let (app, _) = build_app(false);
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn root_redirects_to_form() {
    let (app, _) = build_app(false);
    let resp = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/form");

    let resp = app.oneshot(get("/form")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("multipart/form-data"));
}

#[tokio::test]
async fn application_without_resume_is_rejected() {
    let (app, store) = build_app(false);
    let body = multipart(
        &[("name", "Ada"), ("email", "ada@example.com"), ("skills", "python")],
        None,
    );
    let resp = app.oneshot(apply_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(json["error"].as_str().unwrap().contains("resume"));
    assert_eq!(store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn unmatched_skills_are_not_shortlisted() {
    let (app, store) = build_app(false);
    let body = multipart(
        &[("name", "Bob"), ("email", "bob@example.com"), ("skills", "watercolour painting")],
        Some(("resume.txt", "Gallery curator")),
    );
    let resp = app.oneshot(apply_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["recommendation"], "FAIL");
    assert_eq!(store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn full_flow_over_http() {
    let (app, store) = build_app(false);
    let token = apply(&app, &store).await;

    let resp = app.clone().oneshot(get(&format!("/coding-test/{token}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["completed"], false);
    assert!(!json["question"].as_str().unwrap().is_empty());

    let resp = app
        .clone()
        .oneshot(form_post(&format!("/coding-test/{token}"), CODE))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["completed"], true);
    assert_eq!(json["score"], 85);
    assert_eq!(json["recommendation"], "PASS");
    assert_eq!(json["status"], "coding_passed");
    assert_eq!(json["next_link"], format!("http://hire.test/tech-interview/{token}"));

    app.clone().oneshot(get(&format!("/tech-interview/{token}"))).await.unwrap();
    let resp = app
        .clone()
        .oneshot(form_post(&format!("/tech-interview/{token}"), TECH))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "tech_passed");

    app.clone().oneshot(get(&format!("/hr-interview/{token}"))).await.unwrap();
    let resp = app
        .clone()
        .oneshot(form_post(&format!("/hr-interview/{token}"), HR))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "offered");

    let resp = app.oneshot(get(&format!("/offer-letter/{token}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Ada Lovelace"));
    assert!(html.contains("Offer Letter"));
}

#[tokio::test]
async fn resubmitting_returns_the_stored_result() {
    let (app, store) = build_app(false);
    let token = apply(&app, &store).await;
    let uri = format!("/coding-test/{token}");
    app.clone().oneshot(get(&uri)).await.unwrap();

    let first = body_json(app.clone().oneshot(form_post(&uri, CODE)).await.unwrap()).await;
    let resp = app.clone().oneshot(form_post(&uri, "code=print(1)")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let second = body_json(resp).await;
    assert_eq!(second["completed"], true);
    assert_eq!(second["score"], first["score"]);
    assert_eq!(second["feedback"], first["feedback"]);
    assert!(second.get("status").is_none());

    let view = body_json(app.oneshot(get(&uri)).await.unwrap()).await;
    assert_eq!(view["completed"], true);
    assert!(view.get("question").is_none());
}

#[tokio::test]
async fn answer_before_opening_the_question_conflicts() {
    let (app, store) = build_app(false);
    let token = apply(&app, &store).await;

    let resp = app
        .clone()
        .oneshot(form_post(&format!("/coding-test/{token}"), CODE))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(resp).await["error"],
        "Open the question before submitting an answer."
    );
    assert!(!store.get(&token).await.unwrap().unwrap().coding_test_completed);
}

#[tokio::test]
async fn locked_and_invalid_links() {
    let (app, store) = build_app(false);
    let token = apply(&app, &store).await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/tech-interview/{token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .clone()
        .oneshot(form_post(&format!("/hr-interview/{token}"), "answer=hello"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .clone()
        .oneshot(get(&format!("/offer-letter/{token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app.clone().oneshot(get("/coding-test/not-a-token")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "Invalid or expired link.");

    let resp = app.oneshot(get("/offer-letter/not-a-token")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_states_is_off_by_default() {
    let (app, _) = build_app(false);
    let resp = app.oneshot(get("/debug/states")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_states_lists_candidates() {
    let (app, store) = build_app(true);
    let token = apply(&app, &store).await;

    let resp = app.oneshot(get("/debug/states")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["total_states"], 1);
    assert_eq!(json["tokens"][0], token.as_str());
    let state = &json["states"][token.as_str()];
    assert_eq!(state["name"], "Ada Lovelace");
    assert_eq!(state["status"], "shortlisted");
    assert_eq!(state["coding_test_completed"], false);
}
