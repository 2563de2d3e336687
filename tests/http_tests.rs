// Integration tests for the HTTP control surface

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{CountingOutput, ScriptedCapture};
use http_body_util::BodyExt;
use interview_stream::channel::{
    InboundEvent, LoopbackPeer, LoopbackTransport, OutboundEvent, SessionIdentity, Transport,
};
use interview_stream::http::{create_router, AppState};
use interview_stream::playback::MessageLog;
use interview_stream::session::{InterviewSession, SessionConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn app() -> (Router, mpsc::UnboundedReceiver<LoopbackPeer>) {
    let (transport, peers) = LoopbackTransport::new(32);
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let state = AppState::new(Arc::new(move |log: MessageLog| {
        let (capture, _feeds) = ScriptedCapture::new();
        Ok(InterviewSession::new(
            SessionConfig::default(),
            SessionIdentity::new("token", "candidate@example.com"),
            Box::new(capture),
            transport.clone(),
            Box::new(log),
            Arc::new(CountingOutput::default()),
        ))
    }));

    (create_router(state), peers)
}

async fn call(app: &Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())?,
        )
        .await?;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, body))
}

async fn wait_for_state(app: &Router, state: &str) -> Result<Value> {
    for _ in 0..200 {
        let (status, body) = call(app, "GET", "/session/status").await?;
        if status == StatusCode::OK && body["state"] == state {
            return Ok(body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("session never reached {}", state)
}

async fn wait_for_messages(app: &Router, count: usize) -> Result<()> {
    for _ in 0..200 {
        let (_, body) = call(app, "GET", "/session/messages").await?;
        if body["messages"].as_array().map(Vec::len) == Some(count) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("message panel never reached {} entries", count)
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (app, _peers) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_no_session_yet() -> Result<()> {
    let (app, _peers) = app();

    let (status, _) = call(&app, "GET", "/session/status").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "POST", "/session/stop").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "POST", "/session/responding").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "GET", "/session/messages").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["controls"]["start_enabled"], true);
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_session_lifecycle_over_http() -> Result<()> {
    let (app, mut peers) = app();

    let (status, body) = call(&app, "POST", "/session/start").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["session_id"]
        .as_str()
        .is_some_and(|id| id.starts_with("interview-")));

    let mut peer = peers.recv().await.expect("channel opened");
    wait_for_state(&app, "Connecting").await?;

    // A second start is refused while the first is active
    let (status, _) = call(&app, "POST", "/session/start").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Toggling needs an established connection
    let (status, _) = call(&app, "POST", "/session/responding").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    assert!(peer.emit(InboundEvent::Connected).await);
    wait_for_state(&app, "Streaming").await?;

    let (status, _) = call(&app, "POST", "/session/responding").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(peer.recv().await, Some(OutboundEvent::SetResponding(true)));

    assert!(
        peer.emit(InboundEvent::RespondingStatus {
            active: false,
            message: Some("Please answer again".to_string()),
        })
        .await
    );
    wait_for_messages(&app, 1).await?;

    let (status, body) = call(&app, "POST", "/session/stop").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Stopped");
    assert_eq!(body["stats"]["responding"], false);

    let (_, body) = call(&app, "GET", "/session/messages").await?;
    let texts: Vec<&str> = body["messages"]
        .as_array()
        .expect("messages array")
        .iter()
        .filter_map(|m| m["text"].as_str())
        .collect();
    assert_eq!(texts, vec!["Please answer again", "Stopped"]);
    assert_eq!(body["controls"]["start_enabled"], true);
    assert_eq!(body["controls"]["stop_enabled"], false);

    // A stopped session can be replaced by a new one
    let (status, _) = call(&app, "POST", "/session/start").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (_, body) = call(&app, "GET", "/session/messages").await?;
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(0));
    Ok(())
}
