use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::config::AppConfig;
use crate::llm::GenerationClient;
use crate::normalized::{TranscriptEvent, sse_event};
use crate::session::{SessionStore, TranscriptSnapshot, TurnId};
use crate::ui;

/// Request bodies carry a single chat message.
const BODY_LIMIT_BYTES: usize = 256 * 1024;

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    client: Arc<dyn GenerationClient>,
) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&config), client);

    spawn_session_sweeper(
        state.sessions.clone(),
        config.session_idle_timeout(),
        config.session_sweep_interval(),
    );

    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    Router::new()
        // HTML pages
        .route("/", get(index_handler))
        // API routes
        .route("/api/sessions", post(api_create_session))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route(
            "/api/sessions/{id}/messages",
            post(api_submit_message).delete(api_clear_messages),
        )
        .route("/api/sessions/{id}/events", get(api_session_events))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        // Bounds the time to produce response headers; SSE bodies stream past it.
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                let Some(duration) = timeout else {
                    return next.run(req).await;
                };
                match tokio::time::timeout(duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop sessions idle longer than `idle_timeout`.
fn spawn_session_sweeper(sessions: SessionStore, idle_timeout: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle_timeout);
            if removed > 0 {
                info!(
                    name: "session.expired",
                    removed,
                    remaining = sessions.len(),
                    "Expired idle sessions"
                );
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Index page handler.
async fn index_handler() -> impl IntoResponse {
    Html(ui::index_page())
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Session info returned on creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session ID for this conversation.
    pub id: String,
}

/// Request body for the submit API.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// User message text.
    pub text: String,
}

/// Response from the submit API.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Whether the message was appended and a generation started.
    pub accepted: bool,
    /// Placeholder receiving the streamed response, when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_id: Option<TurnId>,
    /// State right after the submit.
    pub snapshot: TranscriptSnapshot,
}

/// POST /api/sessions - Create a new session.
async fn api_create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionInfo>) {
    let session = state.sessions.create();
    info!(
        name: "session.created",
        session_id = %session.id(),
        active_sessions = state.sessions.len(),
        "Session created"
    );
    (
        StatusCode::CREATED,
        Json(SessionInfo {
            id: session.id().to_string(),
        }),
    )
}

/// GET /api/sessions/:id - Get the transcript snapshot.
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TranscriptSnapshot>, StatusCode> {
    state
        .sessions
        .get(&id)
        .map(|session| Json(session.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /api/sessions/:id - Delete a session.
async fn api_delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => {
            info!(name: "session.deleted", session_id = %id, "Session deleted");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// POST /api/sessions/:id/messages - Submit user text.
async fn api_submit_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let request = session.submit_and_spawn(&req.text, Arc::clone(&state.client));
    match &request {
        Some(r) => info!(
            name: "chat.submitted",
            session_id = %id,
            generation = r.generation,
            placeholder_id = %r.placeholder_id,
            prompt_turns = r.prompt.len(),
            "Message accepted"
        ),
        None => debug!(
            session_id = %id,
            message_length = req.text.len(),
            "Message ignored (blank or generation in flight)"
        ),
    }

    Ok(Json(SubmitResponse {
        accepted: request.is_some(),
        placeholder_id: request.map(|r| r.placeholder_id),
        snapshot: session.snapshot(),
    }))
}

/// DELETE /api/sessions/:id/messages - Clear the transcript.
async fn api_clear_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TranscriptSnapshot>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.clear();
    info!(name: "chat.cleared", session_id = %id, "Transcript cleared");
    Ok(Json(session.snapshot()))
}

/// GET /api/sessions/:id/events - SSE stream of transcript changes.
async fn api_session_events(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (snapshot, rx) = session.subscribe();
    debug!(session_id = %id, revision = snapshot.revision, "SSE subscriber attached");

    // A lagged subscriber has missed deltas; close so the browser reconnects
    // and starts over from a fresh snapshot.
    let updates = BroadcastStream::new(rx).map_while(move |res| match res {
        Ok(event) => Some(event),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(session_id = %id, skipped, "SSE subscriber lagged, closing for resync");
            None
        }
    });

    let stream = tokio_stream::once(TranscriptEvent::Snapshot(snapshot)).chain(updates);

    build_sse_response(stream).into_response()
}

fn build_sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = TranscriptEvent> + Send + 'static,
{
    let stream = stream.map(|event| Ok(sse_event(&event)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
