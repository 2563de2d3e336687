use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use interview_stream::{
    create_router, AppState, AudioOutput, BackendClient, CaptureFactory, CaptureSource, Config,
    InterviewSession, LogOutput, MessageLog, SessionHandle, SessionIdentity,
    SessionLifecycleState, SocketIoTransport, Transport, WavDirOutput,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "interview-stream", version, about = "Live interview media streaming client")]
struct Cli {
    /// Config file, without extension
    #[arg(long, default_value = "config/interview-stream")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control surface
    Serve(SessionArgs),
    /// Stream one interview until it ends or Ctrl-C
    Stream {
        #[command(flatten)]
        session: SessionArgs,
        /// Create the interview on the backend first (needs --cookie)
        #[arg(long)]
        company: Option<String>,
        #[arg(long, default_value = "")]
        job_description: String,
    },
    /// Check an access cookie against the backend
    Verify {
        #[arg(long)]
        cookie: String,
    },
}

#[derive(Args, Clone)]
struct SessionArgs {
    /// WAV file replayed as the microphone
    #[arg(long)]
    audio_file: Option<PathBuf>,
    /// Encoded video file replayed as the camera
    #[arg(long)]
    video_file: Option<PathBuf>,
    /// Interview token (overrides config)
    #[arg(long)]
    token: Option<String>,
    /// Participant email (overrides config)
    #[arg(long)]
    email: Option<String>,
    /// Backend access cookie
    #[arg(long)]
    cookie: Option<String>,
}

impl SessionArgs {
    fn capture_source(&self) -> CaptureSource {
        match &self.audio_file {
            Some(audio) => CaptureSource::File {
                audio: audio.clone(),
                video: self.video_file.clone(),
            },
            None => CaptureSource::Devices,
        }
    }

    fn identity(&self, cfg: &Config) -> SessionIdentity {
        let base = cfg.identity();
        SessionIdentity::new(
            self.token.clone().unwrap_or(base.token),
            self.email.clone().unwrap_or(base.participant_email),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve(args) => serve(cfg, args).await,
        Command::Stream {
            session,
            company,
            job_description,
        } => stream(cfg, session, company, job_description).await,
        Command::Verify { cookie } => verify(cfg, cookie).await,
    }
}

fn audio_output(cfg: &Config) -> Result<Arc<dyn AudioOutput>> {
    Ok(match &cfg.playback.output_dir {
        Some(dir) => Arc::new(WavDirOutput::new(dir.clone())?),
        None => Arc::new(LogOutput),
    })
}

fn build_session(
    cfg: &Config,
    args: &SessionArgs,
    identity: SessionIdentity,
    transport: Arc<dyn Transport>,
    output: Arc<dyn AudioOutput>,
    log: MessageLog,
) -> Result<InterviewSession> {
    let capture = CaptureFactory::create(args.capture_source())?;
    Ok(InterviewSession::new(
        cfg.session_config(),
        identity,
        capture,
        transport,
        Box::new(log),
        output,
    ))
}

async fn serve(cfg: Config, args: SessionArgs) -> Result<()> {
    let identity = args.identity(&cfg);
    if !identity.is_complete() {
        warn!("No interview token/email configured; sessions will be refused by the server");
    }

    let transport: Arc<dyn Transport> = Arc::new(SocketIoTransport::new(cfg.channel_config()));
    let output = audio_output(&cfg)?;
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let cfg = Arc::new(cfg);

    let factory_cfg = cfg.clone();
    let state = AppState::new(Arc::new(move |log: MessageLog| {
        build_session(
            &factory_cfg,
            &args,
            identity.clone(),
            transport.clone(),
            output.clone(),
            log,
        )
    }));

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control surface listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn stream(
    cfg: Config,
    args: SessionArgs,
    company: Option<String>,
    job_description: String,
) -> Result<()> {
    let identity = match company {
        Some(company) => {
            let client = BackendClient::new(&cfg.backend.base_url, args.cookie.as_deref())?;
            client.create_interview(&company, &job_description).await?
        }
        None => args.identity(&cfg),
    };
    if !identity.is_complete() {
        bail!("Interview token and email are required (use --token/--email or --company)");
    }

    let log = MessageLog::new();
    let transport: Arc<dyn Transport> = Arc::new(SocketIoTransport::new(cfg.channel_config()));
    let session = build_session(
        &cfg,
        &args,
        identity,
        transport,
        audio_output(&cfg)?,
        log.clone(),
    )?;

    let (handle, task) = SessionHandle::spawn(session);
    handle.start().await?;

    tokio::select! {
        result = handle.wait_for(SessionLifecycleState::Stopped) => {
            if let Err(e) = result {
                error!("Session ended early: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping");
            handle.stop().await?;
        }
    }

    drop(handle);
    let stats = task.await.context("Session task failed")?;

    for message in log.messages() {
        info!("[{}] {}", message.timestamp, message.text);
    }
    info!(
        "Session {} finished: {} audio / {} video chunks, {} bytes, {} dropped",
        stats.session_id,
        stats.audio_chunks_sent,
        stats.video_chunks_sent,
        stats.bytes_sent,
        stats.chunks_dropped
    );

    Ok(())
}

async fn verify(cfg: Config, cookie: String) -> Result<()> {
    let client = BackendClient::new(&cfg.backend.base_url, Some(&cookie))?;
    if client.verify().await? {
        info!("Session cookie is valid");
        Ok(())
    } else {
        bail!("Session cookie was rejected by {}", client.base_url())
    }
}
