use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use filing_dialogue::{
    Collaborators, DialogueError, DialogueMachine, DialogueRunner, Event, Expiry,
    InMemorySessionStorage, Intent, IntentOutbox, NotificationScheduler, Phase, Rating, Session,
    SessionStorage,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{path::Path as FsPath, sync::Arc, time::Duration};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::telemetry::correlation_id_middleware;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn dialogue_error(session_id: &str, err: DialogueError) -> ApiError {
    match err {
        DialogueError::SessionNotFound(_) => not_found_error("Session not found", session_id),
        DialogueError::InvalidRating(_) => bad_request_error(&err.to_string()),
        other => {
            error!(session_id = %session_id, error = %other, "Dialogue failure");
            internal_error("Failed to process session event", &other.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: DialogueRunner,
    pub outbox: Arc<IntentOutbox>,
}

impl AppState {
    /// Wire a runner around the given collaborators. The returned receiver
    /// yields notification expiries and must be handed to
    /// [`spawn_expiry_listener`].
    pub fn new(
        machine: DialogueMachine,
        collaborators: Collaborators,
        storage: Arc<dyn SessionStorage>,
    ) -> (Self, UnboundedReceiver<Expiry>) {
        let outbox = Arc::new(IntentOutbox::new());
        let (scheduler, expired) = NotificationScheduler::new();
        let runner = DialogueRunner::new(machine, storage, collaborators, outbox.clone(), scheduler);
        (Self { runner, outbox }, expired)
    }
}

/// Feed fired notification timers back into their sessions.
pub fn spawn_expiry_listener(
    runner: DialogueRunner,
    mut expired: UnboundedReceiver<Expiry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(expiry) = expired.recv().await {
            if let Err(e) = runner.handle_expiry(expiry).await {
                warn!(error = %e, "Failed to apply notification expiry");
            }
        }
    })
}

/// Evicts sessions that nobody has touched for a while, together with any
/// intents still buffered for them.
#[derive(Clone)]
pub struct SessionSweeper {
    state: AppState,
    storage: Arc<InMemorySessionStorage>,
    max_idle: Duration,
}

impl SessionSweeper {
    pub fn new(state: AppState, storage: Arc<InMemorySessionStorage>, max_idle: Duration) -> Self {
        Self {
            state,
            storage,
            max_idle,
        }
    }

    /// Sweep forever, a few times per idle window.
    pub async fn run(self) {
        let every = (self.max_idle / 4).max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }

    pub async fn sweep(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle));
        match cutoff {
            Some(cutoff) => self.sweep_before(cutoff).await,
            None => 0,
        }
    }

    /// Evict every session last saved before `cutoff`.
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for session_id in self.storage.idle_since(cutoff) {
            match self
                .state
                .runner
                .end_session_if_idle(&session_id, cutoff)
                .await
            {
                Ok(true) => {
                    self.state.outbox.drain(&session_id);
                    evicted += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to evict session"),
            }
        }
        if evicted > 0 {
            info!(evicted, remaining = self.storage.len(), "Evicted idle sessions");
        }
        evicted
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub phase: Phase,
    pub input_enabled: bool,
    pub intents: Vec<Intent>,
}

pub fn build_router(app_state: AppState, filings_dir: &FsPath) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/chat", post(chat))
        .route("/session/{id}", get(get_session).delete(end_session))
        .route("/session/{id}/intents", get(poll_intents))
        .route("/session/{id}/reset", post(reset_session))
        .route("/session/{id}/rating", post(select_rating))
        .route("/session/{id}/comment", post(edit_comment))
        .route("/session/{id}/feedback", post(submit_feedback))
        .nest_service("/filings", ServeDir::new(filings_dir))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

fn turn(state: &AppState, session_id: String, phase: Phase, input_enabled: bool) -> TurnResponse {
    let intents = state.outbox.drain(&session_id);
    TurnResponse {
        session_id,
        phase,
        input_enabled,
        intents,
    }
}

async fn dispatch(state: &AppState, session_id: String, event: Event) -> ApiResult<TurnResponse> {
    let settled = state
        .runner
        .dispatch(&session_id, event)
        .await
        .map_err(|e| dialogue_error(&session_id, e))?;
    Ok(Json(turn(
        state,
        session_id,
        settled.phase,
        settled.input_enabled(),
    )))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<TurnResponse> {
    info!(
        session_id = ?request.session_id,
        message_length = request.message.len(),
        "Processing chat message"
    );

    let session_id = match request.session_id {
        Some(session_id) => {
            if Uuid::parse_str(&session_id).is_err() {
                error!(session_id = %session_id, "Invalid session ID format");
                return Err(bad_request_error("Invalid session ID format"));
            }
            session_id
        }
        None => {
            let session_id = Uuid::new_v4().to_string();
            info!(session_id = %session_id, "Creating new session");
            state
                .runner
                .start_session(&session_id)
                .await
                .map_err(|e| dialogue_error(&session_id, e))?;
            session_id
        }
    };

    dispatch(&state, session_id, Event::UserMessage(request.message)).await
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Session> {
    state
        .runner
        .session(&session_id)
        .await
        .map(Json)
        .map_err(|e| dialogue_error(&session_id, e))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    state
        .runner
        .end_session(&session_id)
        .await
        .map_err(|e| dialogue_error(&session_id, e))?;
    state.outbox.drain(&session_id);
    Ok(Json(json!({ "session_id": session_id, "ended": true })))
}

async fn poll_intents(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<TurnResponse> {
    let session = state
        .runner
        .session(&session_id)
        .await
        .map_err(|e| dialogue_error(&session_id, e))?;
    Ok(Json(turn(
        &state,
        session_id,
        session.state.phase,
        session.state.input_enabled(),
    )))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<TurnResponse> {
    info!(session_id = %session_id, "New query requested");
    dispatch(&state, session_id, Event::NewQuery).await
}

async fn select_rating(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<RatingRequest>,
) -> ApiResult<TurnResponse> {
    let rating = Rating::try_from(request.rating).map_err(|e| dialogue_error(&session_id, e))?;
    dispatch(&state, session_id, Event::SelectRating(rating)).await
}

async fn edit_comment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<TurnResponse> {
    dispatch(&state, session_id, Event::EditComment(request.comment)).await
}

async fn submit_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<TurnResponse> {
    if let Some(comment) = request.comment {
        state
            .runner
            .dispatch(&session_id, Event::EditComment(comment))
            .await
            .map_err(|e| dialogue_error(&session_id, e))?;
    }
    dispatch(&state, session_id, Event::SubmitFeedback).await
}
