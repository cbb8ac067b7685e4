//! HTTP server: issue-tracker webhooks and the chat gateway relay.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/github` | Issue-tracker webhook (HMAC-SHA256 signed) |
//! | `POST` | `/events/message` | Relayed chat message |
//! | `POST` | `/events/reaction` | Relayed reaction on a message |
//! | `POST` | `/commands/{name}` | Relayed chat command |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The relay endpoints require `Authorization: Bearer <token>` when
//! `[server].internal_token` is set. The webhook endpoint requires a valid
//! `X-Hub-Signature-256` when `[server].webhook_secret` is set.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid issues payload" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use report_tracker_core::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::bridge::{Bridge, BridgeOutcome};
use crate::chat::DiscordClient;
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::db;
use crate::github::GitHubClient;
use crate::intake::{self, IncomingMessage, IntakeOutcome};
use crate::invocation::CommandInvocation;
use crate::migrate;
use crate::reactions::{self, ReactionEvent, ReactionOutcome};
use crate::service::Tracker;
use crate::sqlite_store::SqliteStore;
use crate::webhook;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tracker: Arc<Tracker>,
    pub bridge: Arc<Bridge>,
    pub commands: Arc<CommandRegistry>,
}

impl AppState {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            config: Arc::new(tracker.config().clone()),
            bridge: Arc::new(Bridge::new(tracker.clone())),
            commands: Arc::new(CommandRegistry::with_builtins()),
            tracker,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/github", post(handle_github))
        .route("/events/message", post(handle_message))
        .route("/events/reaction", post(handle_reaction))
        .route("/commands/{name}", post(handle_command))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the server against the configured SQLite database and the live
/// chat and issue-tracker APIs. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;

    let config = Arc::new(config.clone());
    let tracker = Arc::new(Tracker::new(
        config.clone(),
        Arc::new(SqliteStore::new(pool)),
        Arc::new(DiscordClient::from_config(&config.discord)?),
        Arc::new(GitHubClient::new(&config.github)),
    ));
    let app = router(AppState::new(tracker));

    tracing::info!(bind = %config.server.bind, "report tracker listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Internal failures are logged in full; the response stays generic.
fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "internal error".to_string(),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn check_relay_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.server.internal_token.as_deref() else {
        return Ok(());
    };
    let presented = header(headers, "authorization").and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(unauthorized("missing or invalid bearer token"))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /github ============

#[derive(Serialize)]
struct WebhookResponse {
    outcome: String,
}

async fn handle_github(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = state.config.server.webhook_secret.as_deref() {
        if let Err(e) =
            webhook::verify_signature(secret, &body, header(&headers, "X-Hub-Signature-256"))
        {
            tracing::warn!(error = %e, "webhook signature verification failed");
            return Err(unauthorized(e));
        }
    }

    let event_type = header(&headers, "X-GitHub-Event")
        .ok_or_else(|| bad_request("missing X-GitHub-Event header"))?;
    let event = webhook::parse_event(event_type, &body)
        .map_err(|e| bad_request(format!("invalid {} payload: {}", event_type, e)))?;

    let outcome = state
        .bridge
        .handle(header(&headers, "X-GitHub-Delivery"), event)
        .await
        .map_err(internal)?;
    if outcome != BridgeOutcome::Ignored {
        tracing::info!(event = event_type, outcome = ?outcome, "webhook processed");
    }
    Ok(Json(WebhookResponse {
        outcome: format!("{:?}", outcome),
    }))
}

// ============ POST /events/message ============

#[derive(Serialize)]
struct MessageResponse {
    created: Option<String>,
    references: usize,
}

async fn handle_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(msg): Json<IncomingMessage>,
) -> Result<Json<MessageResponse>, AppError> {
    check_relay_token(&state, &headers)?;
    let outcome = intake::handle_message(&state.tracker, &msg)
        .await
        .map_err(internal)?;
    Ok(Json(match outcome {
        IntakeOutcome::Created(report) => MessageResponse {
            created: Some(report.report_id),
            references: 0,
        },
        IntakeOutcome::Referenced(n) => MessageResponse {
            created: None,
            references: n,
        },
        IntakeOutcome::Ignored => MessageResponse {
            created: None,
            references: 0,
        },
    }))
}

// ============ POST /events/reaction ============

#[derive(Serialize)]
struct ReactionResponse {
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn handle_reaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ReactionEvent>,
) -> Result<Json<ReactionResponse>, AppError> {
    check_relay_token(&state, &headers)?;
    let outcome = reactions::handle_reaction(&state.tracker, &event)
        .await
        .map_err(internal)?;
    let (outcome, message) = match outcome {
        ReactionOutcome::Ignored => ("ignored", None),
        ReactionOutcome::Voted(_) => ("voted", None),
        ReactionOutcome::Accepted => ("accepted", None),
        ReactionOutcome::Denied => ("denied", None),
        ReactionOutcome::Rejected(m) => ("rejected", Some(m)),
    };
    Ok(Json(ReactionResponse {
        outcome: outcome.to_string(),
        message,
    }))
}

// ============ POST /commands/{name} ============

#[derive(Deserialize)]
struct CommandRequest {
    user_id: UserId,
    channel_id: u64,
    #[serde(default)]
    args: String,
}

async fn handle_command(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_relay_token(&state, &headers)?;
    let inv = CommandInvocation {
        chat: state.tracker.lifecycle().chat(),
        user: req.user_id,
        channel_id: req.channel_id,
    };
    if !state
        .commands
        .dispatch(&name, &req.args, &inv, &state.tracker)
        .await
    {
        return Err(not_found(format!("no command registered with name: {}", name)));
    }
    Ok(Json(serde_json::json!({ "handled": true })))
}
