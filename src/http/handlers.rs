use super::state::{ActiveSession, AppState};
use crate::playback::{Controls, DisplayedMessage};
use crate::session::{SessionHandle, SessionLifecycleState, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long `stop` waits for the session to finish tearing down
const STOP_WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: SessionLifecycleState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: SessionLifecycleState,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub controls: Controls,
    pub messages: Vec<DisplayedMessage>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn no_session() -> Response {
    error_response(StatusCode::NOT_FOUND, "No interview session".to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Create a session and start streaming
pub async fn start_session(State(state): State<AppState>) -> Response {
    let mut current = state.session.write().await;

    if let Some(active) = current.as_ref() {
        let status = active.handle.state();
        if status.is_active() {
            return error_response(
                StatusCode::CONFLICT,
                format!(
                    "Session {} is already {:?}",
                    active.handle.session_id(),
                    status
                ),
            );
        }
    }

    // A stopped (or never started) session is replaced
    if let Some(previous) = current.take() {
        drop(previous.handle);
        if let Err(e) = previous.task.await {
            warn!("Previous session task failed: {}", e);
        }
    }

    state.log.clear();
    let session = match (state.factory)(state.log.clone()) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {:#}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create session: {:#}", e),
            );
        }
    };

    let (handle, task) = SessionHandle::spawn(session);
    if let Err(e) = handle.start().await {
        error!("Failed to start session: {:#}", e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to start session: {:#}", e),
        );
    }

    let session_id = handle.session_id().to_string();
    info!("Session {} starting", session_id);
    *current = Some(ActiveSession { handle, task });

    (
        StatusCode::ACCEPTED,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: SessionLifecycleState::Idle,
            message: format!("Session {} starting", session_id),
        }),
    )
        .into_response()
}

/// POST /session/stop
/// Stop the current session and report its final stats
pub async fn stop_session(State(state): State<AppState>) -> Response {
    let current = state.session.read().await;
    let Some(active) = current.as_ref() else {
        return no_session();
    };

    if let Err(e) = active.handle.stop().await {
        warn!("Stop not delivered: {:#}", e);
    }

    let stats = match tokio::time::timeout(
        STOP_WAIT,
        active.handle.wait_for(SessionLifecycleState::Stopped),
    )
    .await
    {
        Ok(Ok(stats)) => stats,
        // Session was never started; it has nothing to tear down
        Ok(Err(_)) => active.handle.stats(),
        Err(_) => {
            error!("Session {} did not stop in time", active.handle.session_id());
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "Session did not stop in time".to_string(),
            );
        }
    };

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            session_id: stats.session_id.clone(),
            status: stats.state,
            stats,
        }),
    )
        .into_response()
}

/// POST /session/responding
/// Toggle whether the participant is responding
pub async fn toggle_responding(State(state): State<AppState>) -> Response {
    let current = state.session.read().await;
    let Some(active) = current.as_ref() else {
        return no_session();
    };

    let status = active.handle.state();
    if status != SessionLifecycleState::Streaming {
        return error_response(
            StatusCode::CONFLICT,
            format!("Cannot toggle responding while {:?}", status),
        );
    }

    match active.handle.toggle_responding().await {
        Ok(()) => (StatusCode::ACCEPTED, Json(active.handle.stats())).into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, format!("{:#}", e)),
    }
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> Response {
    let current = state.session.read().await;
    match current.as_ref() {
        Some(active) => (StatusCode::OK, Json(active.handle.stats())).into_response(),
        None => no_session(),
    }
}

/// GET /session/messages
/// Message panel and control state
pub async fn session_messages(State(state): State<AppState>) -> impl IntoResponse {
    Json(MessagesResponse {
        controls: state.log.controls(),
        messages: state.log.messages(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
