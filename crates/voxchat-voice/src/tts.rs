//! **Text-to-Speech (TTS)**: turn a [`ResponseText`] into an [`AudioBlob`].
//!
//! Engines: Coqui `tts` CLI (subprocess), OpenAI-compatible `/audio/speech`
//! and a placeholder that returns a short silent WAV.

use crate::audio::{silence_wav, AudioBlob, AudioEncoding};
use crate::error::{EngineError, EngineResult, VoiceResult};
use crate::health::{binary_available, required_files, ComponentHealth};
use crate::http::{build_client, classify_transport, error_from_response};
use crate::process::ProcessPool;
use crate::text::ResponseText;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Text-to-speech engine.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: ResponseText) -> EngineResult<AudioBlob>;

    fn health(&self) -> ComponentHealth;
}

// -----------------------------------------------------------------------------
// Coqui CLI
// -----------------------------------------------------------------------------

fn default_coqui_binary() -> PathBuf {
    PathBuf::from("tts")
}

fn default_coqui_model() -> PathBuf {
    PathBuf::from("coqui_utils/checkpoint_1260000-inference.pth")
}

fn default_coqui_config() -> PathBuf {
    PathBuf::from("coqui_utils/config.json")
}

fn default_coqui_speakers() -> Option<PathBuf> {
    Some(PathBuf::from("coqui_utils/speakers.pth"))
}

fn default_coqui_speaker() -> Option<String> {
    Some("wibowo".to_string())
}

fn default_max_concurrent() -> usize {
    1
}

/// Settings for the Coqui `tts` command-line synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoquiCliConfig {
    #[serde(default = "default_coqui_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_coqui_model")]
    pub model_path: PathBuf,
    #[serde(default = "default_coqui_config")]
    pub config_path: PathBuf,
    /// Multi-speaker models only.
    #[serde(default = "default_coqui_speakers")]
    pub speakers_file_path: Option<PathBuf>,
    #[serde(default = "default_coqui_speaker")]
    pub speaker: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CoquiCliConfig {
    fn default() -> Self {
        Self {
            binary: default_coqui_binary(),
            model_path: default_coqui_model(),
            config_path: default_coqui_config(),
            speakers_file_path: default_coqui_speakers(),
            speaker: default_coqui_speaker(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Runs `tts --text … --out_path <tmp>/speech.wav` and returns the WAV it writes.
#[derive(Debug, Clone)]
pub struct CoquiCliTts {
    config: CoquiCliConfig,
    pool: ProcessPool,
}

impl CoquiCliTts {
    pub fn new(config: CoquiCliConfig) -> Self {
        let pool = ProcessPool::new("coqui-tts", config.max_concurrent);
        Self { config, pool }
    }

    pub fn config(&self) -> &CoquiCliConfig {
        &self.config
    }

    fn required(&self) -> Vec<(&'static str, &Path)> {
        let mut files = vec![
            ("Model file", self.config.model_path.as_path()),
            ("Config file", self.config.config_path.as_path()),
        ];
        if let Some(ref speakers) = self.config.speakers_file_path {
            files.push(("Speakers file", speakers.as_path()));
        }
        files
    }
}

#[async_trait]
impl TtsEngine for CoquiCliTts {
    fn name(&self) -> &str {
        "coqui-tts"
    }

    async fn synthesize(&self, text: ResponseText) -> EngineResult<AudioBlob> {
        let files = required_files(&self.required());
        if !files.is_ok() {
            return Err(EngineError::Unavailable(files.message));
        }

        let _permit = self.pool.acquire().await?;
        let scratch = tempfile::Builder::new()
            .prefix("voxchat-tts-")
            .tempdir()
            .map_err(|e| EngineError::Internal(format!("scratch dir: {}", e)))?;
        let out_path = scratch.path().join("speech.wav");

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--text")
            .arg(text.as_str())
            .arg("--model_path")
            .arg(&self.config.model_path)
            .arg("--config_path")
            .arg(&self.config.config_path);
        if let Some(ref speakers) = self.config.speakers_file_path {
            cmd.arg("--speakers_file_path").arg(speakers);
        }
        if let Some(ref speaker) = self.config.speaker {
            cmd.arg("--speaker_idx").arg(speaker);
        }
        cmd.arg("--out_path").arg(&out_path);

        self.pool.run(cmd).await?;

        let bytes = tokio::fs::read(&out_path).await.map_err(|e| {
            EngineError::Internal(format!(
                "TTS output file not created at {}: {}",
                out_path.display(),
                e
            ))
        })?;
        let blob = AudioBlob::from_wav_bytes(bytes).map_err(|e| {
            EngineError::Internal(format!("TTS produced unreadable audio: {}", e))
        })?;
        debug!(target: "voxchat::tts", bytes = blob.len(), "Coqui synthesis complete");
        Ok(blob)
    }

    fn health(&self) -> ComponentHealth {
        if !binary_available(&self.config.binary) {
            return ComponentHealth::error(format!(
                "Binary exists: false ({})",
                self.config.binary.display()
            ));
        }
        required_files(&self.required())
    }
}

// -----------------------------------------------------------------------------
// OpenAI-compatible speech API
// -----------------------------------------------------------------------------

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_tts_model() -> String {
    "tts-1".to_string()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTtsConfig {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// tts-1 (fast) or tts-1-hd (higher quality).
    #[serde(default = "default_openai_tts_model")]
    pub model: String,
    /// alloy, echo, fable, onyx, nova, shimmer, ...
    #[serde(default = "default_openai_voice")]
    pub voice: String,
}

impl Default for OpenAiTtsConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_openai_tts_model(),
            voice: default_openai_voice(),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Remote TTS over an OpenAI-compatible `/audio/speech` endpoint. Always requests WAV.
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    config: OpenAiTtsConfig,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(config: OpenAiTtsConfig) -> VoiceResult<Self> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    fn api_key(&self) -> EngineResult<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EngineError::Unavailable("TTS API key not configured".to_string()))
    }
}

#[async_trait]
impl TtsEngine for OpenAiTts {
    fn name(&self) -> &str {
        "openai-tts"
    }

    async fn synthesize(&self, text: ResponseText) -> EngineResult<AudioBlob> {
        let api_key = self.api_key()?;
        let url = format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'));
        let body = SpeechRequest {
            model: &self.config.model,
            input: text.as_str(),
            voice: &self.config.voice,
            response_format: AudioEncoding::Wav.extension(),
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("TTS", e))?;
        if !res.status().is_success() {
            return Err(error_from_response("TTS", res).await);
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| EngineError::Internal(format!("TTS response read failed: {}", e)))?;
        if bytes.is_empty() {
            return Err(EngineError::Internal("TTS returned no audio".to_string()));
        }
        AudioBlob::from_wav_bytes(bytes.to_vec())
            .map_err(|e| EngineError::Internal(format!("TTS returned unreadable audio: {}", e)))
    }

    fn health(&self) -> ComponentHealth {
        match self.api_key() {
            Ok(_) => ComponentHealth::ok(format!(
                "API key configured ({}, voice {})",
                self.config.model, self.config.voice
            )),
            Err(_) => ComponentHealth::error("API key missing"),
        }
    }
}

// -----------------------------------------------------------------------------
// Placeholder
// -----------------------------------------------------------------------------

const PLACEHOLDER_SILENCE: Duration = Duration::from_millis(250);
const PLACEHOLDER_SAMPLE_RATE: u32 = 16000;

/// Placeholder TTS: a quarter second of 16 kHz mono silence.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsEngine for PlaceholderTts {
    fn name(&self) -> &str {
        "placeholder-tts"
    }

    async fn synthesize(&self, _text: ResponseText) -> EngineResult<AudioBlob> {
        silence_wav(PLACEHOLDER_SILENCE, PLACEHOLDER_SAMPLE_RATE)
    }

    fn health(&self) -> ComponentHealth {
        ComponentHealth::ok("Placeholder TTS (no engine configured)")
    }
}
