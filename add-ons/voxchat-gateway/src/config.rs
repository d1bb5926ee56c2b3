//! Gateway configuration: defaults, then `config/voxchat.toml` (or `VOXCHAT_CONFIG`),
//! then `VOXCHAT__SECTION__KEY` environment variables.
//!
//! Engine sections embed the engine config structs from `voxchat-voice` directly.
//! API keys left unset are filled from the usual env vars (`GEMINI_API_KEY`,
//! `OPENROUTER_API_KEY`, `STT_API_KEY`, `TTS_API_KEY`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use voxchat_voice::{
    CoquiCliConfig, GeminiConfig, OpenAiSttConfig, OpenAiTtsConfig, OpenRouterConfig,
    StageTimeouts, WhisperCliConfig,
};

const DEFAULT_CONFIG_PATH: &str = "config/voxchat";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub stt: SttSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tts: TtsSection,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Directory for the daily-rolling `voxchat-gateway.log`.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_stt_secs() -> f64 {
    120.0
}

fn default_llm_secs() -> f64 {
    60.0
}

fn default_tts_secs() -> f64 {
    120.0
}

/// Per-stage budgets in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_stt_secs")]
    pub stt: f64,
    #[serde(default = "default_llm_secs")]
    pub llm: f64,
    #[serde(default = "default_tts_secs")]
    pub tts: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stt: default_stt_secs(),
            llm: default_llm_secs(),
            tts: default_tts_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn stage_timeouts(&self) -> Result<StageTimeouts, String> {
        let secs = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Duration::try_from_secs_f64(v).map_err(|e| format!("timeouts.{}: {}", name, e))
            } else {
                Err(format!("timeouts.{} must be a positive number of seconds, got {}", name, v))
            }
        };
        Ok(StageTimeouts::new(
            secs("stt", self.stt)?,
            secs("llm", self.llm)?,
            secs("tts", self.tts)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SttBackend {
    #[default]
    WhisperCli,
    #[serde(rename = "openai")]
    OpenAi,
    /// In-process whisper-rs; needs the `whisper` feature.
    Whisper,
    Placeholder,
}

fn default_local_whisper_model() -> PathBuf {
    PathBuf::from("whisper.cpp/models/ggml-base.bin")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalWhisperConfig {
    #[serde(default = "default_local_whisper_model")]
    pub model_path: PathBuf,
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for LocalWhisperConfig {
    fn default() -> Self {
        Self {
            model_path: default_local_whisper_model(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SttSection {
    #[serde(default)]
    pub backend: SttBackend,
    #[serde(default)]
    pub whisper_cli: WhisperCliConfig,
    #[serde(default)]
    pub openai: OpenAiSttConfig,
    #[serde(default)]
    pub whisper: LocalWhisperConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmBackend {
    #[default]
    Gemini,
    Openrouter,
    Placeholder,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsBackend {
    #[default]
    Coqui,
    #[serde(rename = "openai")]
    OpenAi,
    Placeholder,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsSection {
    #[serde(default)]
    pub backend: TtsBackend,
    #[serde(default)]
    pub coqui: CoquiCliConfig,
    #[serde(default)]
    pub openai: OpenAiTtsConfig,
}

impl GatewayConfig {
    /// Load from file + environment. Call after `dotenvy::dotenv()`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("VOXCHAT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let built = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("VOXCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: GatewayConfig = built.try_deserialize()?;
        cfg.fill_credentials(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    /// Fill API keys the config left unset from well-known environment variables.
    pub fn fill_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fill = |slot: &mut Option<String>, var: &str| {
            let empty = slot.as_deref().map_or(true, |k| k.trim().is_empty());
            if empty {
                if let Some(v) = lookup(var).filter(|v| !v.trim().is_empty()) {
                    *slot = Some(v);
                }
            }
        };
        fill(&mut self.llm.gemini.api_key, "GEMINI_API_KEY");
        fill(&mut self.llm.openrouter.api_key, "OPENROUTER_API_KEY");
        fill(&mut self.stt.openai.api_key, "STT_API_KEY");
        fill(&mut self.tts.openai.api_key, "TTS_API_KEY");
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
