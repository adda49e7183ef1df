//! HTTP + WebSocket API for scripted fallback sessions
//!
//! Endpoints:
//! - POST /session/new - Create new session
//! - GET /session/{id} - Get session summary
//! - POST /session/{id}/turn - Run one scripted turn
//! - WS /ws/{id} - Live turn reports
//! - GET /health - Health check

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::config::Config;
use crate::core::catalog::StaticCatalog;
use crate::core::session::{Session, SessionSummary, TurnScript};
use crate::types::{ConversationState, TurnInput, TurnReport};

/// Session plus its live update channel
#[derive(Debug)]
pub struct ApiSession {
    pub id: String,
    pub session: Session,
    pub update_tx: broadcast::Sender<TurnReport>,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, ApiSession>>,
    pub config: Config,
    pub catalog: StaticCatalog,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    /// Initial conversation state
    #[serde(default)]
    pub state: Option<ConversationState>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub summary: SessionSummary,
}

/// Run turn response
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub report: TurnReport,
    /// Event the caller should feed back as the next turn's input
    pub reprompt_event: Option<TurnInput>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
    pub fallback_enabled: bool,
}

/// Create the API router
pub fn create_router(config: Config, catalog: StaticCatalog) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        config,
        catalog,
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/turn", post(run_turn))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
        fallback_enabled: state.config.fallback.enabled,
    })
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, StatusCode> {
    let session_id = generate_session_id();
    let (tx, _) = broadcast::channel(100);

    let mut session = Session::new(state.config.clone(), state.catalog.clone());
    if let Some(conversation) = req.state {
        session.set_state(conversation);
    }

    let mut sessions = state.sessions.write().await;
    sessions.insert(
        session_id.clone(),
        ApiSession {
            id: session_id.clone(),
            session,
            update_tx: tx,
        },
    );
    info!(session = %session_id, "session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
    }))
}

/// Get session summary
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let sessions = state.sessions.read().await;
    let entry = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SessionStatusResponse {
        session_id: entry.id.clone(),
        summary: entry.session.summary(),
    }))
}

/// Run one scripted turn
async fn run_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(script): Json<TurnScript>,
) -> Result<Json<TurnResponse>, StatusCode> {
    let mut sessions = state.sessions.write().await;
    let entry = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;

    let report = entry.session.run_turn(script);
    let reprompt_event = entry.session.take_reprompt_event();

    // no subscribers is fine
    let _ = entry.update_tx.send(report.clone());
    debug!(session = %id, turn = report.turn, "turn report broadcast");

    Ok(Json(TurnResponse { report, reprompt_event }))
}

/// WebSocket handler for live turn reports
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let sessions = state.sessions.read().await;
    let entry = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let rx = entry.update_tx.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Handle WebSocket connection
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<TurnReport>) {
    while let Ok(report) = rx.recv().await {
        let json = serde_json::to_string(&report).unwrap_or_default();
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: &str, config: Config, catalog: StaticCatalog) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config, catalog);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "fallback arbiter API listening");
    info!("  POST /session/new      - Create session");
    info!("  GET  /session/:id      - Get summary");
    info!("  POST /session/:id/turn - Run turn");
    info!("  WS   /ws/:id           - Live turn reports");
    info!("  GET  /health           - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
