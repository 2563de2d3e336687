use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::{ChannelConfig, SessionIdentity};
use crate::media::{AudioConstraints, MediaConstraints, VideoConstraints};
use crate::recorder::{AudioContainer, AudioEncoderConfig, VideoEncoderConfig};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub channel: ChannelSettings,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub playback: PlaybackConfig,
    pub session: SessionSettings,
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "interview-stream".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub endpoint: String,
    pub namespace: String,
    pub send_queue_capacity: usize,
    pub connect_attempts: u32,
    pub connect_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let defaults = ChannelConfig::default();
        Self {
            endpoint: defaults.endpoint,
            namespace: defaults.namespace,
            send_queue_capacity: defaults.send_queue_capacity,
            connect_attempts: defaults.connect_attempts,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            reconnect_base_ms: defaults.reconnect_base.as_millis() as u64,
            reconnect_max_ms: defaults.reconnect_max.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: usize,
    pub timeslice_ms: u64,
    pub container: AudioContainer,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let constraints = AudioConstraints::default();
        Self {
            sample_rate: constraints.sample_rate,
            channels: constraints.channels,
            buffer_size: constraints.buffer_size,
            timeslice_ms: 500,
            container: AudioContainer::Wav,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ideal_frame_rate: u32,
    pub min_frame_rate: u32,
    pub mime_type: String,
    pub timeslice_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let constraints = VideoConstraints::default();
        Self {
            ideal_frame_rate: constraints.ideal_frame_rate,
            min_frame_rate: constraints.min_frame_rate,
            mime_type: VideoEncoderConfig::default().mime_type,
            timeslice_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub text_delay_ms: u64,
    pub success_sentinel: String,
    /// Write decoded clips here instead of only logging them
    pub output_dir: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            text_delay_ms: 750,
            success_sentinel: "Success".to_string(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub stop_timeout_ms: u64,
    pub chunk_queue: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 2000,
            chunk_queue: 32,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    pub interview_token: String,
    pub email: String,
}

impl Config {
    /// Load `<path>.{toml,yaml,json}` if present, then apply
    /// `INTERVIEW_STREAM__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("INTERVIEW_STREAM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            constraints: MediaConstraints {
                audio: AudioConstraints {
                    sample_rate: self.audio.sample_rate,
                    channels: self.audio.channels,
                    buffer_size: self.audio.buffer_size,
                },
                video: VideoConstraints {
                    ideal_frame_rate: self.video.ideal_frame_rate,
                    min_frame_rate: self.video.min_frame_rate,
                },
            },
            audio: AudioEncoderConfig {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                container: self.audio.container,
            },
            video: VideoEncoderConfig {
                mime_type: self.video.mime_type.clone(),
            },
            audio_timeslice: Duration::from_millis(self.audio.timeslice_ms),
            video_timeslice: Duration::from_millis(self.video.timeslice_ms),
            text_delay: Duration::from_millis(self.playback.text_delay_ms),
            success_sentinel: self.playback.success_sentinel.clone(),
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
            chunk_queue: self.session.chunk_queue,
            ..SessionConfig::default()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            endpoint: self.channel.endpoint.clone(),
            namespace: self.channel.namespace.clone(),
            send_queue_capacity: self.channel.send_queue_capacity,
            connect_attempts: self.channel.connect_attempts,
            connect_timeout: Duration::from_millis(self.channel.connect_timeout_ms),
            reconnect_base: Duration::from_millis(self.channel.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.channel.reconnect_max_ms),
        }
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity::new(&self.identity.interview_token, &self.identity.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let cfg = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(cfg.service.http.port, 8787);
        assert_eq!(cfg.playback.success_sentinel, "Success");

        let session = cfg.session_config();
        assert_eq!(session.audio_timeslice, Duration::from_millis(500));
        assert_eq!(session.text_delay, Duration::from_millis(750));
        assert_eq!(session.constraints.audio.buffer_size, 16384);
        assert_eq!(session.constraints.video.min_frame_rate, 24);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.toml");
        std::fs::write(
            &path,
            r#"
[channel]
endpoint = "https://interviews.example.com/"
connect_attempts = 2

[audio]
container = "pcm"
timeslice_ms = 250

[identity]
interview_token = "tok"
email = "candidate@example.com"
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        let channel = cfg.channel_config();
        assert_eq!(channel.endpoint, "https://interviews.example.com/");
        assert_eq!(channel.connect_attempts, 2);
        assert_eq!(channel.connect_timeout, Duration::from_secs(10));
        assert_eq!(channel.send_queue_capacity, 256);

        let session = cfg.session_config();
        assert_eq!(session.audio.container, AudioContainer::Pcm);
        assert_eq!(session.audio_timeslice, Duration::from_millis(250));
        assert!(cfg.identity().is_complete());
    }
}
