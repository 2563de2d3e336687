// Integration tests for the interview session state machine
//
// The session runs against an in-memory channel and a capture backend fed by
// the test. Time is paused so recorder cadence and text delay are exact.

mod common;

use anyhow::Result;
use base64::Engine;
use common::{wav_bytes, CountingOutput, Feeds, ScriptedCapture};
use interview_stream::channel::{
    ChatTurn, InboundEvent, LoopbackPeer, LoopbackTransport, OutboundEvent, SessionIdentity,
};
use interview_stream::playback::{Controls, MessageLog};
use interview_stream::recorder::{AudioContainer, MediaKind};
use interview_stream::session::{
    InterviewSession, SessionConfig, SessionHandle, SessionLifecycleState, SessionStats,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use SessionLifecycleState::{Connecting, Idle, Stopped, Streaming};

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<SessionStats>,
    peer: LoopbackPeer,
    feeds: Feeds,
    log: MessageLog,
    output: Arc<CountingOutput>,
}

fn identity() -> SessionIdentity {
    SessionIdentity::new("interview-token", "candidate@example.com")
}

fn pcm_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.audio.container = AudioContainer::Pcm;
    config
}

fn chat(message: &str) -> ChatTurn {
    ChatTurn {
        message: message.to_string(),
        timestamp: "2024-05-01T10:00:00Z".to_string(),
        audio: None,
        interview_ended: false,
        role: Some("interviewer".to_string()),
    }
}

fn texts(log: &MessageLog) -> Vec<String> {
    log.messages().into_iter().map(|m| m.text).collect()
}

fn build(
    config: SessionConfig,
) -> (
    InterviewSession,
    mpsc::UnboundedReceiver<LoopbackPeer>,
    Feeds,
    MessageLog,
    Arc<CountingOutput>,
) {
    let (transport, peers) = LoopbackTransport::new(64);
    let (capture, feeds) = ScriptedCapture::new();
    let log = MessageLog::new();
    let output = Arc::new(CountingOutput::default());

    let session = InterviewSession::new(
        config,
        identity(),
        Box::new(capture),
        Arc::new(transport),
        Box::new(log.clone()),
        output.clone(),
    );
    (session, peers, feeds, log, output)
}

/// Spawn a session and bring it to Streaming
async fn streaming(config: SessionConfig) -> Result<Harness> {
    let (session, mut peers, feeds, log, output) = build(config);
    let (handle, task) = SessionHandle::spawn(session);

    handle.start().await?;
    let peer = peers.recv().await.expect("channel opened");
    handle.wait_for(Connecting).await?;

    assert!(peer.emit(InboundEvent::Connected).await);
    handle.wait_for(Streaming).await?;

    Ok(Harness {
        handle,
        task,
        peer,
        feeds,
        log,
        output,
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_identity_is_presented_at_open() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    assert_eq!(h.peer.identity, identity());
    assert_eq!(h.feeds.acquired(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_chunk_forwarded_exactly_once() -> Result<()> {
    let mut h = streaming(pcm_config()).await?;

    // 2048 PCM16 samples = 4096 bytes
    h.feeds.audio(vec![7i16; 2048]).await;

    match h.peer.recv().await {
        Some(OutboundEvent::Chunk(chunk)) => {
            assert_eq!(chunk.kind(), MediaKind::Audio);
            assert_eq!(chunk.len(), 4096);
            assert_eq!(&chunk.payload()[..2], &7i16.to_le_bytes());
        }
        other => panic!("expected audio chunk, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.peer.try_recv().is_none(), "chunk must be sent once");

    let stats = h.handle.stats();
    assert_eq!(stats.audio_chunks_sent, 1);
    assert_eq!(stats.bytes_sent, 4096);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_chunks_arrive_in_production_order() -> Result<()> {
    let mut h = streaming(pcm_config()).await?;

    for marker in 1u8..=3 {
        // Off the 500ms tick so each frame lands in its own chunk
        h.feeds.video(vec![marker; 16]).await;
        tokio::time::sleep(Duration::from_millis(700)).await;
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match h.peer.recv().await {
            Some(OutboundEvent::Chunk(chunk)) => {
                assert_eq!(chunk.kind(), MediaKind::Video);
                seen.push(chunk.payload()[0]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(seen, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_chat_text_appears_after_delay_without_audio() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    assert!(
        h.peer
            .emit(InboundEvent::ChatTurn(chat("Tell me about yourself")))
            .await
    );

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(texts(&h.log).is_empty(), "text must wait for the delay");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(texts(&h.log), vec!["Tell me about yourself"]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.log.messages().len(), 1, "appended exactly once");
    assert_eq!(h.log.messages()[0].timestamp, "2024-05-01T10:00:00Z");

    let stats = h.handle.stats();
    assert_eq!(stats.chat_turns, 1);
    assert_eq!(stats.audio_playbacks, 0);
    assert_eq!(h.output.played(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_chat_audio_is_played_and_empty_audio_skipped() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    let mut silent = chat("First");
    silent.audio = Some(String::new());
    assert!(h.peer.emit(InboundEvent::ChatTurn(silent)).await);

    let mut spoken = chat("Second");
    spoken.audio =
        Some(base64::engine::general_purpose::STANDARD.encode(wav_bytes(&[0i16; 1600])));
    assert!(h.peer.emit(InboundEvent::ChatTurn(spoken)).await);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(texts(&h.log), vec!["First", "Second"]);
    assert_eq!(h.handle.stats().audio_playbacks, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_success_status_is_silent() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    assert!(
        h.peer
            .emit(InboundEvent::RespondingStatus {
                active: true,
                message: None,
            })
            .await
    );
    settle().await;
    assert!(h.handle.stats().responding);

    assert!(
        h.peer
            .emit(InboundEvent::RespondingStatus {
                active: false,
                message: Some("Success".to_string()),
            })
            .await
    );
    settle().await;

    assert!(!h.handle.stats().responding);
    assert!(h.log.messages().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_non_success_status_message_is_appended() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    assert!(
        h.peer
            .emit(InboundEvent::RespondingStatus {
                active: false,
                message: Some("Could not transcribe your answer".to_string()),
            })
            .await
    );
    // Inactive without a message appends nothing
    assert!(
        h.peer
            .emit(InboundEvent::RespondingStatus {
                active: false,
                message: None,
            })
            .await
    );
    settle().await;

    assert_eq!(texts(&h.log), vec!["Could not transcribe your answer"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_toggle_sends_one_request_and_server_overrides() -> Result<()> {
    let mut h = streaming(pcm_config()).await?;

    h.handle.toggle_responding().await?;
    assert_eq!(h.peer.recv().await, Some(OutboundEvent::SetResponding(true)));
    settle().await;
    assert!(h.peer.try_recv().is_none(), "one request per toggle");
    assert!(h.handle.stats().responding);
    assert!(h.log.controls().responding);

    // Server disagrees: its value wins
    assert!(
        h.peer
            .emit(InboundEvent::RespondingStatus {
                active: false,
                message: None,
            })
            .await
    );
    settle().await;
    assert!(!h.handle.stats().responding);
    assert!(!h.log.controls().responding);

    h.handle.toggle_responding().await?;
    assert_eq!(h.peer.recv().await, Some(OutboundEvent::SetResponding(true)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interview_end_stops_session() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    let mut last = chat("Thank you, that concludes the interview");
    last.interview_ended = true;
    assert!(h.peer.emit(InboundEvent::ChatTurn(last)).await);

    let stats = h.handle.wait_for(Stopped).await?;
    assert_eq!(stats.stop_reason.as_deref(), Some("interview ended"));

    // Pending text is flushed ahead of the terminal message
    assert_eq!(
        texts(&h.log),
        vec!["Thank you, that concludes the interview", "Stopped"]
    );
    assert!(h.feeds.released());
    assert!(h.peer.is_closed());
    assert_eq!(h.log.controls(), Controls::default());

    let final_stats = h.task.await?;
    assert_eq!(final_stats.state, Stopped);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_flushes_and_releases() -> Result<()> {
    let mut h = streaming(pcm_config()).await?;

    h.feeds.audio(vec![1i16; 100]).await;
    h.handle.stop().await?;
    let stats = h.handle.wait_for(Stopped).await?;

    match h.peer.try_recv() {
        Some(OutboundEvent::Chunk(chunk)) => {
            assert_eq!(chunk.kind(), MediaKind::Audio);
            assert_eq!(chunk.len(), 200);
        }
        other => panic!("expected final audio chunk, got {:?}", other),
    }

    assert_eq!(stats.audio_chunks_sent, 1);
    assert!(!stats.responding);
    assert!(stats.stopped_at.is_some());
    assert!(h.feeds.released());
    assert_eq!(texts(&h.log), vec!["Stopped"]);

    // Events after stop are ignored
    assert!(!h.peer.emit(InboundEvent::ChatTurn(chat("late"))).await);
    h.task.await?;
    assert_eq!(texts(&h.log), vec!["Stopped"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_stops_session() -> Result<()> {
    let h = streaming(pcm_config()).await?;

    assert!(
        h.peer
            .emit(InboundEvent::Disconnected {
                reason: "transport close".to_string(),
            })
            .await
    );

    h.handle.wait_for(Stopped).await?;
    assert_eq!(texts(&h.log), vec!["Connection lost: transport close"]);
    assert!(h.feeds.released());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_server_end_counts_as_disconnect() -> Result<()> {
    let h = streaming(pcm_config()).await?;
    drop(h.peer);

    h.handle.wait_for(Stopped).await?;
    assert_eq!(texts(&h.log), vec!["Connection lost: transport ended"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_connect_error_while_connecting() -> Result<()> {
    let (session, mut peers, feeds, log, _output) = build(pcm_config());
    let (handle, task) = SessionHandle::spawn(session);

    handle.start().await?;
    let peer = peers.recv().await.expect("channel opened");
    handle.wait_for(Connecting).await?;
    assert!(!log.controls().start_enabled);
    assert!(log.controls().stop_enabled);

    assert!(
        peer.emit(InboundEvent::ConnectError {
            message: "refused".to_string(),
        })
        .await
    );

    handle.wait_for(Stopped).await?;
    assert_eq!(texts(&log), vec!["Could not connect: refused"]);
    assert!(feeds.released());
    assert_eq!(task.await?.audio_chunks_sent, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_device_denied_leaves_session_idle() -> Result<()> {
    let (transport, mut peers) = LoopbackTransport::new(8);
    let (capture, _feeds) = ScriptedCapture::denied();
    let log = MessageLog::new();

    let mut session = InterviewSession::new(
        pcm_config(),
        identity(),
        Box::new(capture),
        Arc::new(transport),
        Box::new(log.clone()),
        Arc::new(CountingOutput::default()),
    );

    assert!(session.start().await.is_err());
    assert_eq!(session.state(), Idle);
    assert!(!session.has_channel());
    assert!(peers.try_recv().is_err(), "no channel opened");

    let messages = texts(&log);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Could not access camera/microphone"));
    assert_eq!(log.controls(), Controls::default());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_direct_stop_tears_down_everything() -> Result<()> {
    let (mut session, mut peers, feeds, log, _output) = build(pcm_config());

    session.start().await?;
    let peer = peers.recv().await.expect("channel opened");
    assert_eq!(session.state(), Connecting);

    session.handle_event(InboundEvent::Connected).await;
    assert_eq!(session.state(), Streaming);
    assert_eq!(session.recorders_running(), 2);
    assert!(log.controls().live);
    assert!(log.controls().toggle_enabled);

    session.stop().await;
    assert_eq!(session.state(), Stopped);
    assert_eq!(session.recorders_running(), 0);
    assert!(!session.has_channel());
    assert!(!session.is_responding());
    assert!(feeds.released());
    assert!(peer.is_closed());

    // Stop is idempotent and restart is refused
    session.stop().await;
    session.start().await?;
    assert_eq!(session.state(), Stopped);
    assert_eq!(feeds.acquired(), 1);
    assert_eq!(texts(&log), vec!["Stopped"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_toggle_ignored_unless_streaming() -> Result<()> {
    let (mut session, mut peers, _feeds, _log, _output) = build(pcm_config());

    assert!(!session.toggle_responding());

    session.start().await?;
    let mut peer = peers.recv().await.expect("channel opened");
    assert!(!session.toggle_responding());
    assert!(peer.try_recv().is_none());

    session.handle_event(InboundEvent::Connected).await;
    assert!(session.toggle_responding());
    assert_eq!(peer.recv().await, Some(OutboundEvent::SetResponding(true)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_events_before_connect_are_ignored() -> Result<()> {
    let (mut session, _peers, _feeds, log, _output) = build(pcm_config());
    session.start().await?;

    session
        .handle_event(InboundEvent::RespondingStatus {
            active: true,
            message: None,
        })
        .await;
    session
        .handle_event(InboundEvent::ChatTurn(chat("early")))
        .await;

    assert!(!session.is_responding());
    assert_eq!(session.stats().chat_turns, 0);
    assert!(log.messages().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_closes_loop() -> Result<()> {
    let (session, _peers, feeds, log, _output) = build(pcm_config());
    let (handle, task) = SessionHandle::spawn(session);

    handle.stop().await?;
    let stats = task.await?;

    assert_eq!(stats.state, Idle);
    assert_eq!(feeds.acquired(), 0);
    assert!(log.messages().is_empty());
    assert!(handle.start().await.is_err());
    Ok(())
}
