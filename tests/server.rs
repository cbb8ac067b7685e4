//! HTTP routes driven in-process through the router.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness_with, test_config, Harness, TRACKER_CHANNEL};
use report_tracker::server::{router, AppState};
use report_tracker::webhook::sign;
use report_tracker_core::store::ReportStore;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "hook-secret";
const TOKEN: &str = "relay-token";

fn app() -> (Harness, Router) {
    let mut config = test_config();
    config.server.webhook_secret = Some(SECRET.to_string());
    config.server.internal_token = Some(TOKEN.to_string());
    let h = harness_with(config);
    let app = router(AppState::new(h.tracker.clone()));
    (h, app)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn github_request(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::post("/github")
        .header("content-type", "application/json")
        .header("X-GitHub-Event", event);
    if let Some(sig) = signature {
        builder = builder.header("X-Hub-Signature-256", sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn relay_request(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_h, app) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (_h, app) = app();
    let body = r#"{"zen":"Keep it logically awesome."}"#;

    let response = app
        .clone()
        .oneshot(github_request("ping", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = sign("wrong-secret", body.as_bytes());
    let response = app
        .oneshot(github_request("ping", body, Some(forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_webhook_accepts_signed_ping() {
    let (_h, app) = app();
    let body = r#"{"zen":"Keep it logically awesome."}"#;
    let response = app
        .oneshot(github_request("ping", body, Some(sign(SECRET, body.as_bytes()))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "Ignored");
}

#[tokio::test]
async fn test_webhook_opened_issue_creates_report() {
    let (h, app) = app();
    let body = json!({
        "action": "opened",
        "repository": { "full_name": "org/repo" },
        "sender": { "login": "alice" },
        "issue": {
            "number": 12,
            "title": "Crash on load",
            "body": "Steps",
            "state": "open",
            "user": { "login": "alice" },
            "labels": []
        }
    })
    .to_string();
    let response = app
        .oneshot(github_request("issues", &body, Some(sign(SECRET, body.as_bytes()))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.get("AVR-001").await.unwrap().is_some());
    assert_eq!(h.chat.sends_to(TRACKER_CHANNEL).len(), 1);
}

#[tokio::test]
async fn test_webhook_malformed_payload() {
    let (_h, app) = app();
    let body = r#"{"action": "opened"}"#;
    let response = app
        .oneshot(github_request("issues", body, Some(sign(SECRET, body.as_bytes()))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_relay_requires_token() {
    let (_h, app) = app();
    let body = json!({ "user_id": 5, "channel_id": 55, "args": "" });
    let response = app
        .clone()
        .oneshot(relay_request("/commands/top", body.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(relay_request("/commands/top", body, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["handled"], true);
}

#[tokio::test]
async fn test_unknown_command_is_not_found() {
    let (_h, app) = app();
    let body = json!({ "user_id": 5, "channel_id": 55 });
    let response = app
        .oneshot(relay_request("/commands/frobnicate", body, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_reaction_relay_votes() {
    let (h, app) = app();
    let report = h.feature("Dark mode").await;
    let body = json!({
        "message_id": report.message.unwrap().message_id,
        "channel_id": TRACKER_CHANNEL,
        "user_id": 5,
        "emoji": h.tracker.config().discord.upvote_emoji,
    });
    let response = app
        .oneshot(relay_request("/events/reaction", body, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "voted");
    assert_eq!(h.store.get("AFR-001").await.unwrap().unwrap().upvotes, 1);
}
