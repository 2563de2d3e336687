use super::config::SessionConfig;
use super::state::{SessionCommand, SessionLifecycleState, StopReason};
use super::stats::SessionStats;
use crate::channel::{ChannelHandle, ChatTurn, InboundEvent, OutboundEvent, SessionIdentity, Transport};
use crate::media::{CaptureBackend, MediaStream};
use crate::playback::{AudioOutput, Controls, PlaybackSink, SessionView};
use crate::recorder::{
    AudioChunkEncoder, AudioRecorder, ChunkedRecorder, MediaChunk, MediaKind, VideoChunkEncoder,
    VideoRecorder,
};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use SessionLifecycleState::{Connecting, Idle, Stopped, Streaming};

/// One interview streaming session.
///
/// Owns the capture backend, both recorders and the channel for its whole
/// lifetime. All state changes happen on the task driving [`run`], so no two
/// handlers ever execute concurrently.
///
/// [`run`]: InterviewSession::run
pub struct InterviewSession {
    config: SessionConfig,
    identity: SessionIdentity,
    capture: Box<dyn CaptureBackend>,
    transport: Arc<dyn Transport>,
    sink: PlaybackSink,
    state: SessionLifecycleState,
    responding: bool,
    media: Option<MediaStream>,
    channel: Option<ChannelHandle>,
    audio_recorder: Option<AudioRecorder>,
    video_recorder: Option<VideoRecorder>,
    chunk_rx: Option<mpsc::Receiver<MediaChunk>>,
    stats: SessionStats,
    stats_tx: watch::Sender<SessionStats>,
}

impl InterviewSession {
    pub fn new(
        config: SessionConfig,
        identity: SessionIdentity,
        capture: Box<dyn CaptureBackend>,
        transport: Arc<dyn Transport>,
        view: Box<dyn SessionView>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        info!(
            "Creating interview session: {} (capture={}, transport={})",
            config.session_id,
            capture.name(),
            transport.name()
        );

        let stats = SessionStats::new(config.session_id.clone());
        let (stats_tx, _) = watch::channel(stats.clone());
        let mut sink = PlaybackSink::new(view, output, config.text_delay);
        sink.set_controls(Controls::default());

        Self {
            config,
            identity,
            capture,
            transport,
            sink,
            state: Idle,
            responding: false,
            media: None,
            channel: None,
            audio_recorder: None,
            video_recorder: None,
            chunk_rx: None,
            stats,
            stats_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn state(&self) -> SessionLifecycleState {
        self.state
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    /// Recorders whose capture task is still running
    pub fn recorders_running(&self) -> usize {
        let audio = self.audio_recorder.as_ref().is_some_and(|r| r.is_recording());
        let video = self.video_recorder.as_ref().is_some_and(|r| r.is_recording());
        audio as usize + video as usize
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.state = self.state;
        stats.responding = self.responding;
        stats.messages_appended = self.sink.appended();
        stats
    }

    /// Watch the session's stats as they change
    pub fn subscribe(&self) -> watch::Receiver<SessionStats> {
        self.stats_tx.subscribe()
    }

    /// Idle → Connecting: acquire devices, then open the channel.
    ///
    /// A device failure leaves the session Idle and is shown to the user.
    /// Starting a session that is not Idle is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != Idle {
            warn!(
                "Session {} is {:?}, ignoring start",
                self.config.session_id, self.state
            );
            return Ok(());
        }

        info!("Starting interview session: {}", self.config.session_id);

        let media = match self.capture.acquire(&self.config.constraints).await {
            Ok(media) => media,
            Err(e) => {
                error!("Failed to acquire media devices: {:#}", e);
                self.sink.append_message(
                    &format!("Could not access camera/microphone: {:#}", e),
                    &now_timestamp(),
                );
                self.publish();
                return Err(e.context("Failed to acquire media devices"));
            }
        };

        self.media = Some(media);
        self.channel = Some(self.transport.open(&self.identity));
        self.state = Connecting;
        self.refresh_controls();
        self.publish();

        info!("Session {} connecting", self.config.session_id);
        Ok(())
    }

    /// Stop streaming; no-op unless Connecting or Streaming
    pub async fn stop(&mut self) {
        self.stop_with(StopReason::UserRequested).await;
    }

    /// Optimistically flip the responding state and ask the server to follow.
    ///
    /// Only valid while Streaming. Returns whether the toggle was applied.
    pub fn toggle_responding(&mut self) -> bool {
        if self.state != Streaming {
            warn!("Responding toggle ignored while {:?}", self.state);
            return false;
        }

        self.responding = !self.responding;
        if let Some(channel) = self.channel.as_mut() {
            channel.send(OutboundEvent::SetResponding(self.responding));
        }

        debug!("Responding toggled locally to {}", self.responding);
        self.refresh_controls();
        self.publish();
        true
    }

    /// Hand a recorder chunk to the channel unchanged
    pub fn forward_chunk(&mut self, chunk: MediaChunk) {
        if !self.state.is_active() {
            debug!("Dropping {:?} chunk while {:?}", chunk.kind(), self.state);
            return;
        }

        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let kind = chunk.kind();
        let len = chunk.len();
        if channel.send(OutboundEvent::Chunk(chunk)) {
            match kind {
                MediaKind::Audio => self.stats.audio_chunks_sent += 1,
                MediaKind::Video => self.stats.video_chunks_sent += 1,
            }
            self.stats.bytes_sent += len;
        }
        self.stats.chunks_dropped = channel.dropped();
    }

    /// React to one inbound channel event
    pub async fn handle_event(&mut self, event: InboundEvent) {
        debug!("Inbound {} while {:?}", event.name(), self.state);

        match event {
            InboundEvent::Connected => self.on_connected(),
            InboundEvent::RespondingStatus { active, message } => {
                self.on_responding_status(active, message)
            }
            InboundEvent::ChatTurn(turn) => self.on_chat_turn(turn).await,
            InboundEvent::ConnectError { message } => {
                if self.state.is_active() {
                    self.stop_with(StopReason::ConnectFailed(message)).await;
                }
            }
            InboundEvent::Disconnected { reason } => {
                if self.state.is_active() {
                    self.stop_with(StopReason::ConnectionLost(reason)).await;
                }
            }
        }
    }

    pub async fn handle_command(&mut self, command: SessionCommand) {
        debug!("Handling command {:?}", command);

        match command {
            SessionCommand::Start => {
                if let Err(e) = self.start().await {
                    error!("Session start failed: {:#}", e);
                }
            }
            SessionCommand::Stop => self.stop().await,
            SessionCommand::ToggleResponding => {
                self.toggle_responding();
            }
        }
    }

    /// Drive the session until it stops, is told to stop before starting, or
    /// the command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> SessionStats {
        info!("Session {} ready", self.config.session_id);

        while self.state != Stopped {
            let due = self.sink.next_due();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Stop) if self.state == Idle => {
                        info!("Stop before start, closing session {}", self.config.session_id);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("Command channel closed, shutting session down");
                        self.stop().await;
                        break;
                    }
                },

                event = next_inbound(&mut self.channel) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        self.handle_event(InboundEvent::Disconnected {
                            reason: "transport ended".to_string(),
                        })
                        .await
                    }
                },

                chunk = next_chunk(&mut self.chunk_rx) => match chunk {
                    Some(chunk) => {
                        self.forward_chunk(chunk);
                        self.publish();
                    }
                    None => {
                        debug!("All recorders have finished");
                        self.chunk_rx = None;
                    }
                },

                _ = sleep_until(due) => {
                    self.sink.deliver_due();
                    self.publish();
                }
            }
        }

        info!("Session {} finished", self.config.session_id);
        self.stats()
    }

    /// Connecting → Streaming
    fn on_connected(&mut self) {
        if self.state != Connecting {
            debug!("Ignoring connect while {:?}", self.state);
            return;
        }

        let Some(media) = self.media.take() else {
            error!("Connected without acquired media");
            return;
        };

        info!("Session {} connected, streaming", self.config.session_id);

        let (chunk_tx, chunk_rx) = mpsc::channel(self.config.chunk_queue.max(1));

        let mut audio = ChunkedRecorder::new(
            AudioChunkEncoder::new(self.config.audio.clone()),
            self.config.audio_timeslice,
        );
        let mut video = ChunkedRecorder::new(
            VideoChunkEncoder::new(self.config.video.clone()),
            self.config.video_timeslice,
        );

        if let Err(e) = audio.start(media.audio, chunk_tx.clone()) {
            error!("Failed to start audio recorder: {:#}", e);
        }
        if let Err(e) = video.start(media.video, chunk_tx) {
            error!("Failed to start video recorder: {:#}", e);
        }

        self.audio_recorder = Some(audio);
        self.video_recorder = Some(video);
        self.chunk_rx = Some(chunk_rx);
        self.state = Streaming;
        self.stats.started_at = Some(Utc::now());
        self.refresh_controls();
        self.publish();
    }

    /// Server-authoritative responding state
    fn on_responding_status(&mut self, active: bool, message: Option<String>) {
        if self.state != Streaming {
            debug!("Ignoring responding status while {:?}", self.state);
            return;
        }

        if active != self.responding {
            info!("Server set responding to {}", active);
        }
        self.responding = active;
        self.refresh_controls();

        if !active {
            match message {
                Some(message) if message != self.config.success_sentinel => {
                    self.sink.append_message(&message, &now_timestamp());
                }
                _ => {}
            }
        }

        self.publish();
    }

    async fn on_chat_turn(&mut self, turn: ChatTurn) {
        if self.state != Streaming {
            debug!("Ignoring chat turn while {:?}", self.state);
            return;
        }

        self.stats.chat_turns += 1;
        self.sink.schedule_message(&turn.message, &turn.timestamp);

        if let Some(audio) = turn.audio.as_deref().filter(|a| !a.is_empty()) {
            self.sink.play_audio(audio);
            self.stats.audio_playbacks += 1;
        }

        if turn.interview_ended {
            info!("Server ended the interview");
            self.stop_with(StopReason::InterviewEnded).await;
        }

        self.publish();
    }

    /// Connecting/Streaming → Stopped. Each teardown step is bounded by the
    /// stop timeout and abandoned if it stalls.
    async fn stop_with(&mut self, reason: StopReason) {
        if !self.state.is_active() {
            debug!("Session {} not active, ignoring stop", self.config.session_id);
            return;
        }

        info!("Stopping session {}: {}", self.config.session_id, reason);
        let limit = self.config.stop_timeout;

        if let Some(recorder) = self.audio_recorder.as_mut() {
            recorder.request_stop();
        }
        if let Some(recorder) = self.video_recorder.as_mut() {
            recorder.request_stop();
        }

        // Final chunks go out before the channel closes
        if let Some(mut chunks) = self.chunk_rx.take() {
            let drain = async {
                while let Some(chunk) = chunks.recv().await {
                    self.forward_chunk(chunk);
                }
            };
            if tokio::time::timeout(limit, drain).await.is_err() {
                warn!("Recorders did not flush within {}ms", limit.as_millis());
            }
        }

        if let Some(recorder) = self.audio_recorder.take() {
            join_recorder(recorder, limit).await;
        }
        if let Some(recorder) = self.video_recorder.take() {
            join_recorder(recorder, limit).await;
        }

        self.media = None;
        match tokio::time::timeout(limit, self.capture.release()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to release {} capture: {:#}", self.capture.name(), e),
            Err(_) => warn!("{} capture release timed out", self.capture.name()),
        }

        if let Some(mut channel) = self.channel.take() {
            self.stats.chunks_dropped = channel.dropped();
            if tokio::time::timeout(limit, channel.close()).await.is_err() {
                warn!("Channel close timed out, aborting transport");
                channel.abort();
            }
        }

        self.sink.flush_pending();
        self.responding = false;
        self.state = Stopped;
        self.stats.stopped_at = Some(Utc::now());
        self.stats.stop_reason = Some(reason.to_string());
        self.refresh_controls();
        self.sink
            .append_message(&reason.terminal_message(), &now_timestamp());
        self.publish();

        info!("Session {} stopped", self.config.session_id);
    }

    fn refresh_controls(&mut self) {
        let controls = match self.state {
            Idle | Stopped => Controls::default(),
            Connecting => Controls {
                start_enabled: false,
                stop_enabled: true,
                toggle_enabled: false,
                responding: false,
                live: false,
            },
            Streaming => Controls {
                start_enabled: false,
                stop_enabled: true,
                toggle_enabled: true,
                responding: self.responding,
                live: true,
            },
        };
        self.sink.set_controls(controls);
    }

    fn publish(&mut self) {
        let stats = self.stats();
        self.stats_tx.send_replace(stats);
    }
}

async fn join_recorder<E: crate::recorder::ChunkEncoder>(
    mut recorder: ChunkedRecorder<E>,
    limit: Duration,
) {
    let kind = recorder.kind();
    match tokio::time::timeout(limit, recorder.join()).await {
        Ok(stats) => debug!("{:?} recorder joined: {} chunks", kind, stats.chunks),
        Err(_) => {
            warn!("{:?} recorder did not stop in time, aborting", kind);
            recorder.abort();
        }
    }
}

async fn next_inbound(channel: &mut Option<ChannelHandle>) -> Option<InboundEvent> {
    match channel {
        Some(channel) if !channel.is_closed() => channel.next_event().await,
        _ => std::future::pending().await,
    }
}

async fn next_chunk(chunks: &mut Option<mpsc::Receiver<MediaChunk>>) -> Option<MediaChunk> {
    match chunks {
        Some(chunks) => chunks.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
