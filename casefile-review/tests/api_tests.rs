//! HTTP-level integration tests

mod helpers;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use casefile_common::Actor;
use casefile_review::api::{USER_ID_HEADER, USER_ROLE_HEADER};
use casefile_review::models::RecordStatus;
use casefile_review::{build_router, AppState, EngineSettings};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn app(env: &TestEnv) -> Router {
    let state = AppState::new(env.pool.clone(), env.event_bus.clone(), EngineSettings::default());
    build_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<Actor>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header(USER_ID_HEADER, actor.user_id.to_string())
            .header(USER_ROLE_HEADER, actor.role.as_str());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let env = setup().await;
    let (status, body) = send(&app(&env), Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "casefile-review");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_health_reports_unavailable_database() {
    let env = setup().await;
    let app = app(&env);
    env.pool.close().await;

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "unavailable");
}

#[tokio::test]
async fn test_identity_headers_required() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/records/{}", record_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let request = Request::builder()
        .uri(format!("/api/records/{}", record_id))
        .header(USER_ID_HEADER, "10")
        .header(USER_ROLE_HEADER, "superuser")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_submission_is_anonymous() {
    let env = setup().await;
    let app = app(&env);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/records")
        .header(USER_ROLE_HEADER, "guest")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "details": { "location": "Springfield" } }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let record: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record["status"], "pending");
    assert_eq!(record["review_cycle"], 0);
    assert!(record["submitted_by"].is_null());
    assert_eq!(record["details"]["location"], "Springfield");
}

#[tokio::test]
async fn test_lock_endpoints() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);
    let uri = format!("/api/records/{}/lock", record_id);

    let (status, body) = send(&app, Method::GET, &uri, Some(editor(EDITOR)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = send(&app, Method::POST, &uri, Some(analyst(FIRST_ANALYST)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locked_by"], FIRST_ANALYST);
    assert_eq!(body["remaining_minutes"], 30);

    let (status, body) = send(&app, Method::POST, &uri, Some(analyst(SECOND_ANALYST)), None).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"]["code"], "LOCK_HELD");
    assert_eq!(body["error"]["retryable"], false);
    assert_eq!(body["error"]["details"]["holder"], FIRST_ANALYST);
    assert!(body["error"]["details"]["remaining_minutes"].as_i64().unwrap() > 0);

    let (status, body) = send(
        &app,
        Method::DELETE,
        &uri,
        Some(analyst(SECOND_ANALYST)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "NOT_LOCK_OWNER");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("{}?extend=true", uri),
        Some(analyst(FIRST_ANALYST)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(analyst(FIRST_ANALYST)), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_transition_endpoints() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);
    let actor = editor(EDITOR);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/advance", record_id),
        Some(actor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NOT_LOCKED");

    send(&app, Method::POST, &format!("/api/records/{}/lock", record_id), Some(actor), None).await;
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/submit-for-review", record_id),
        Some(actor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "first_review");

    // Editors cannot reject
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/reject", record_id),
        Some(actor),
        Some(json!({ "reason": "Duplicate" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["details"]["operation"], "reject");
}

#[tokio::test]
async fn test_approve_blocked_by_issue_over_http() {
    let env = setup().await;
    let record_id = record_at(&env, RecordStatus::FirstValidation).await;
    let app = app(&env);

    let (status, issue) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/issues", record_id),
        Some(analyst(FIRST_ANALYST)),
        Some(json!({
            "field_type": "text",
            "field_name": "location",
            "issue_reason": "Wrong county",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let issue_id = issue["id"].as_str().unwrap().to_string();

    let approver = validator(VALIDATOR);
    send(
        &app,
        Method::POST,
        &format!("/api/records/{}/lock", record_id),
        Some(approver),
        None,
    )
    .await;

    let approve_uri = format!("/api/records/{}/approve", record_id);
    let (status, body) = send(&app, Method::POST, &approve_uri, Some(approver), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "OPEN_ISSUES");
    assert_eq!(body["error"]["details"]["open_issues"], 1);

    let resolve_uri = format!("/api/issues/{}/resolve", issue_id);
    let (status, _) = send(
        &app,
        Method::POST,
        &resolve_uri,
        Some(approver),
        Some(json!({ "resolution": "Fixed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &resolve_uri, Some(approver), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_RESOLVED");

    let (status, body) = send(
        &app,
        Method::POST,
        &approve_uri,
        Some(approver),
        Some(json!({ "notes": "Looks good" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "verified");
    assert_eq!(body["approval_notes"], "Looks good");
}

#[tokio::test]
async fn test_field_endpoints() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);

    let (status, row) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/fields/location/first-pass", record_id),
        Some(analyst(FIRST_ANALYST)),
        Some(json!({ "notes": "Matches report", "source_ids": [3] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["verification_status"], "first_review");
    assert_eq!(row["field_value"], "Springfield");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/records/{}/fields/location/second-pass", record_id),
        Some(analyst(FIRST_ANALYST)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SAME_REVIEWER");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/records/{}/fields", record_id),
        Some(editor(EDITOR)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fields"].as_array().unwrap().len(), 1);
    assert_eq!(body["summary"]["fields_needing_review"], 3);
}

#[tokio::test]
async fn test_queue_endpoint() {
    let env = setup().await;
    let record_id = record_at(&env, RecordStatus::FirstReview).await;
    let app = app(&env);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/queue?stage=needs_first_review",
        Some(analyst(FIRST_ANALYST)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["records"][0]["id"], record_id);
    assert_eq!(body["records"][0]["locked_by_other"], false);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/queue?stage=needs_first_review",
        Some(analyst(SUBMITTER)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/queue?stage=whenever",
        Some(analyst(FIRST_ANALYST)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_record_view_and_history() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);

    send(
        &app,
        Method::POST,
        &format!("/api/records/{}/lock", record_id),
        Some(editor(EDITOR)),
        None,
    )
    .await;

    let (status, view) = send(
        &app,
        Method::GET,
        &format!("/api/records/{}", record_id),
        Some(editor(EDITOR)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["id"], record_id);
    assert_eq!(view["lock_info"]["locked_by"], EDITOR);
    assert_eq!(view["ledger"]["fields_needing_review"], 3);
    assert_eq!(view["blockers"]["open_issues"], 0);

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/api/records/{}/history", record_id),
        Some(editor(EDITOR)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["submitted", "lock_acquired"]);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/records/999999",
        Some(editor(EDITOR)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

async fn send_raw(
    app: &Router,
    uri: &str,
    actor: Actor,
    body: &'static str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(USER_ID_HEADER, actor.user_id.to_string())
        .header(USER_ROLE_HEADER, actor.role.as_str())
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_malformed_first_pass_body_is_rejected() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);

    let (status, body) = send_raw(
        &app,
        &format!("/api/records/{}/fields/location/first-pass", record_id),
        analyst(FIRST_ANALYST),
        r#"{"notes":"cites doc","source_ids":"seven","value":"Shelbyville"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // Nothing was recorded
    let fields = env
        .engine
        .ledger
        .list(record_id, &editor(EDITOR))
        .await
        .unwrap();
    assert!(fields.is_empty());
    let history = env
        .engine
        .submissions
        .history(record_id, &editor(EDITOR))
        .await
        .unwrap();
    assert!(history.iter().all(|e| e.kind != "field_first_pass"));
}

#[tokio::test]
async fn test_malformed_approve_body_is_rejected() {
    let env = setup().await;
    let record_id = record_at(&env, RecordStatus::FirstValidation).await;
    let app = app(&env);
    let approver = validator(VALIDATOR);

    let lock_uri = format!("/api/records/{}/lock", record_id);
    send(&app, Method::POST, &lock_uri, Some(approver), None).await;

    let (status, body) = send_raw(
        &app,
        &format!("/api/records/{}/approve", record_id),
        approver,
        r#"{"notes": ["all fields", "confirmed"]"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["retryable"], false);

    let view = env
        .engine
        .submissions
        .get(record_id, &editor(EDITOR))
        .await
        .unwrap();
    assert_eq!(view.record.status, RecordStatus::FirstValidation);
    assert!(view.record.approval_notes.is_none());
}

#[tokio::test]
async fn test_empty_optional_body_uses_defaults() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let app = app(&env);

    let (status, row) = send_raw(
        &app,
        &format!("/api/records/{}/fields/location/first-pass", record_id),
        analyst(FIRST_ANALYST),
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["field_value"], "Springfield");
}
