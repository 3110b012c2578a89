use crate::audio::AudioBackendConfig;
use crate::session::SessionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `NOTEBOOK_VOICE__VOICE__NATS_URL`.
pub const ENV_PREFIX: &str = "NOTEBOOK_VOICE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub voice: VoiceConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub nats_url: String,
    /// Knowledge context used when an open request names none
    pub context_id: String,
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub frame_size: usize,
    pub playback_sample_rate: u32,
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default)]
    pub output_device: Option<String>,
}

impl Config {
    /// Load defaults, then `path` if it exists, then environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("service.name", "notebook-voice")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8787_i64)?
            .set_default("voice.nats_url", "nats://127.0.0.1:4222")?
            .set_default("voice.context_id", "default")?
            .set_default("voice.subject_prefix", "voice")?
            .set_default("audio.capture_sample_rate", 16000_i64)?
            .set_default("audio.frame_size", 4096_i64)?
            .set_default("audio.playback_sample_rate", 24000_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Per-overlay settings, optionally bound to a different context.
    pub fn session_config(&self, context_id: Option<&str>) -> SessionConfig {
        SessionConfig {
            context_id: context_id
                .map(str::to_string)
                .unwrap_or_else(|| self.voice.context_id.clone()),
            capture_sample_rate: self.audio.capture_sample_rate,
            frame_size: self.audio.frame_size,
            default_playback_rate: self.audio.playback_sample_rate,
            start_muted: false,
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.capture_sample_rate,
            frame_size: self.audio.frame_size,
            device: self.audio.input_device.clone(),
            ..AudioBackendConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.service.name, "notebook-voice");
        assert_eq!(config.audio.capture_sample_rate, 16000);
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.audio.playback_sample_rate, 24000);
        assert_eq!(config.audio.input_device, None);
    }

    #[test]
    fn test_file_overrides_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "[voice]\ncontext_id = \"notebook-42\"\n\n[audio]\nframe_size = 2048\noutput_device = \"Speakers\""
        )?;

        let config = Config::load(file.path().to_str())?;
        assert_eq!(config.voice.context_id, "notebook-42");
        assert_eq!(config.voice.subject_prefix, "voice");
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.audio.output_device.as_deref(), Some("Speakers"));
        Ok(())
    }

    #[test]
    fn test_session_config_context_override() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.session_config(None).context_id, "default");
        assert_eq!(config.session_config(Some("nb-7")).context_id, "nb-7");
        assert_eq!(config.backend_config().frame_size, 4096);
    }
}
