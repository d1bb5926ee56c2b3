//! **Speech-to-Text (STT)**: turn an uploaded [`AudioBlob`] into a [`TranscriptText`].
//!
//! Implement [`SttEngine`] for a new engine; the orchestrator only sees the trait.
//! Shipped engines: whisper.cpp CLI (subprocess), OpenAI-compatible transcription
//! API, in-process Whisper (`whisper` feature) and a fixed-text placeholder.

use crate::audio::AudioBlob;
use crate::error::{EngineError, EngineResult, VoiceResult};
use crate::health::{binary_available, required_files, ComponentHealth};
use crate::http::{build_client, classify_transport, error_from_response};
use crate::process::ProcessPool;
use crate::text::TranscriptText;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Speech-to-text engine. Implementations hold no state between calls.
#[async_trait]
pub trait SttEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe one utterance. Empty or undecodable audio is `EngineError::Rejected`.
    async fn transcribe(&self, audio: AudioBlob) -> EngineResult<TranscriptText>;

    fn health(&self) -> ComponentHealth;
}

fn no_speech() -> EngineError {
    EngineError::Rejected("no speech recognised in audio".to_string())
}

// -----------------------------------------------------------------------------
// whisper.cpp CLI
// -----------------------------------------------------------------------------

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper.cpp/build/bin/whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("whisper.cpp/models/ggml-small-q5_1.bin")
}

fn default_max_concurrent() -> usize {
    1
}

/// Settings for the whisper.cpp `whisper-cli` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCliConfig {
    #[serde(default = "default_whisper_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_whisper_model")]
    pub model_path: PathBuf,
    /// Spoken language hint (`-l`), e.g. "id" or "en". Auto-detect when unset.
    #[serde(default)]
    pub language: Option<String>,
    /// Decoder threads (`-t`).
    #[serde(default)]
    pub threads: Option<u32>,
    /// Concurrent whisper-cli processes allowed.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for WhisperCliConfig {
    fn default() -> Self {
        Self {
            binary: default_whisper_binary(),
            model_path: default_whisper_model(),
            language: None,
            threads: None,
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Runs `whisper-cli -m <model> -f <audio> -otxt -of <base>` in a scratch
/// directory and reads `<base>.txt`.
#[derive(Debug, Clone)]
pub struct WhisperCliStt {
    config: WhisperCliConfig,
    pool: ProcessPool,
}

impl WhisperCliStt {
    pub fn new(config: WhisperCliConfig) -> Self {
        let pool = ProcessPool::new("whisper-cli", config.max_concurrent);
        Self { config, pool }
    }

    pub fn config(&self) -> &WhisperCliConfig {
        &self.config
    }
}

#[async_trait]
impl SttEngine for WhisperCliStt {
    fn name(&self) -> &str {
        "whisper-cli"
    }

    async fn transcribe(&self, audio: AudioBlob) -> EngineResult<TranscriptText> {
        audio.ensure_decodable()?;
        if !self.config.model_path.is_file() {
            return Err(EngineError::Unavailable(format!(
                "Whisper model not found at {}",
                self.config.model_path.display()
            )));
        }

        let _permit = self.pool.acquire().await?;

        // Dropped at the end of the call, including when the stage is abandoned.
        let scratch = tempfile::Builder::new()
            .prefix("voxchat-stt-")
            .tempdir()
            .map_err(|e| EngineError::Internal(format!("scratch dir: {}", e)))?;
        let audio_path = scratch
            .path()
            .join(format!("input.{}", audio.format().encoding.extension()));
        tokio::fs::write(&audio_path, audio.bytes())
            .await
            .map_err(|e| EngineError::Internal(format!("writing audio for whisper-cli: {}", e)))?;
        let output_base = scratch.path().join("transcription");

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-m")
            .arg(&self.config.model_path)
            .arg("-f")
            .arg(&audio_path)
            .arg("-otxt")
            .arg("-of")
            .arg(&output_base);
        if let Some(ref lang) = self.config.language {
            cmd.arg("-l").arg(lang);
        }
        if let Some(threads) = self.config.threads {
            cmd.arg("-t").arg(threads.to_string());
        }

        self.pool.run(cmd).await?;

        let result_path = output_base.with_extension("txt");
        let text = tokio::fs::read_to_string(&result_path).await.map_err(|e| {
            EngineError::Internal(format!(
                "transcription file {} not readable: {}",
                result_path.display(),
                e
            ))
        })?;
        debug!(target: "voxchat::stt", chars = text.len(), "whisper-cli transcript read");
        TranscriptText::new(text).ok_or_else(no_speech)
    }

    fn health(&self) -> ComponentHealth {
        if !binary_available(&self.config.binary) {
            return ComponentHealth::error(format!(
                "Binary exists: false ({})",
                self.config.binary.display()
            ));
        }
        required_files(&[("Whisper model", self.config.model_path.as_path())])
    }
}

// -----------------------------------------------------------------------------
// OpenAI-compatible transcription API
// -----------------------------------------------------------------------------

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_stt_model() -> String {
    "whisper-1".to_string()
}

/// Settings for an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSttConfig {
    /// Base URL without trailing slash.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_stt_model")]
    pub model: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for OpenAiSttConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_openai_stt_model(),
            language: None,
        }
    }
}

/// Remote STT over an OpenAI-compatible transcription API (OpenAI Whisper, Groq, local servers).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    config: OpenAiSttConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl OpenAiStt {
    pub fn new(config: OpenAiSttConfig) -> VoiceResult<Self> {
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
            .ok_or_else(|| EngineError::Unavailable("STT API key not configured".to_string()))
    }
}

#[async_trait]
impl SttEngine for OpenAiStt {
    fn name(&self) -> &str {
        "openai-stt"
    }

    async fn transcribe(&self, audio: AudioBlob) -> EngineResult<TranscriptText> {
        audio.ensure_decodable()?;
        let api_key = self.api_key()?;
        let encoding = audio.format().encoding;
        let url = format!(
            "{}/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(audio.into_bytes())
            .file_name(format!("audio.{}", encoding.extension()))
            .mime_str(encoding.mime_type())
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());
        if let Some(ref lang) = self.config.language {
            form = form.text("language", lang.clone());
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport("STT", e))?;
        if !res.status().is_success() {
            return Err(error_from_response("STT", res).await);
        }
        let parsed: TranscriptionResponse = res
            .json()
            .await
            .map_err(|e| EngineError::Internal(format!("STT response parse failed: {}", e)))?;
        TranscriptText::new(parsed.text).ok_or_else(no_speech)
    }

    fn health(&self) -> ComponentHealth {
        match self.api_key() {
            Ok(_) => ComponentHealth::ok(format!("API key configured ({})", self.config.model)),
            Err(_) => ComponentHealth::error("API key missing"),
        }
    }
}

// -----------------------------------------------------------------------------
// Local Whisper STT (optional feature). Requires whisper.cpp/ggml.
// -----------------------------------------------------------------------------
#[cfg(feature = "whisper")]
mod whisper_stt {
    use super::*;
    use std::sync::{Arc, Mutex};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// In-process Whisper: one loaded model shared by all requests. Inference is
    /// serialized through the state mutex and runs on the blocking pool.
    /// Input must be 16 kHz WAV.
    pub struct WhisperStt {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Arc<Mutex<whisper_rs::WhisperState>>,
        model_path: PathBuf,
        language: Option<String>,
    }

    impl WhisperStt {
        pub fn new(model_path: impl Into<PathBuf>, language: Option<String>) -> VoiceResult<Self> {
            let model_path = model_path.into();
            let path = model_path.to_str().ok_or_else(|| {
                crate::error::VoiceError::Config("Whisper model path is not UTF-8".to_string())
            })?;
            let context =
                WhisperContext::new_with_params(path, WhisperContextParameters::default())
                    .map_err(|e| crate::error::VoiceError::ModelLoad(format!("Whisper load failed: {}", e)))?;
            let state = context.create_state().map_err(|e| {
                crate::error::VoiceError::ModelLoad(format!("Whisper state init failed: {}", e))
            })?;
            Ok(Self {
                context,
                state: Arc::new(Mutex::new(state)),
                model_path,
                language,
            })
        }
    }

    #[async_trait]
    impl SttEngine for WhisperStt {
        fn name(&self) -> &str {
            "whisper"
        }

        async fn transcribe(&self, audio: AudioBlob) -> EngineResult<TranscriptText> {
            audio.ensure_decodable()?;
            let (samples, sample_rate) = audio.decode_wav_mono_f32()?;
            if sample_rate != 16000 {
                return Err(EngineError::Rejected(format!(
                    "Whisper expects 16 kHz; got {} Hz",
                    sample_rate
                )));
            }
            let state = Arc::clone(&self.state);
            let language = self.language.clone();
            let text = tokio::task::spawn_blocking(move || -> EngineResult<String> {
                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_no_timestamps(true);
                params.set_language(language.as_deref());

                let mut state = state
                    .lock()
                    .map_err(|e| EngineError::Internal(format!("Whisper lock poisoned: {}", e)))?;
                state
                    .full(params, &samples)
                    .map_err(|e| EngineError::Internal(format!("Whisper inference failed: {}", e)))?;
                Ok(state
                    .as_iter()
                    .filter_map(|seg| seg.to_str().ok().map(str::to_owned))
                    .collect::<Vec<_>>()
                    .join(" "))
            })
            .await
            .map_err(|e| EngineError::Internal(format!("Whisper task failed: {}", e)))??;
            TranscriptText::new(text).ok_or_else(no_speech)
        }

        fn health(&self) -> ComponentHealth {
            required_files(&[("Whisper model", self.model_path.as_path())])
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_stt::WhisperStt;

// -----------------------------------------------------------------------------
// Placeholder
// -----------------------------------------------------------------------------

/// Placeholder STT: returns a fixed transcript. Use for wiring the pipeline without an engine.
#[derive(Debug, Clone)]
pub struct PlaceholderStt {
    response: String,
}

impl Default for PlaceholderStt {
    fn default() -> Self {
        Self {
            response: "[STT placeholder transcript]".to_string(),
        }
    }
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self { response: s.into() }
    }
}

#[async_trait]
impl SttEngine for PlaceholderStt {
    fn name(&self) -> &str {
        "placeholder-stt"
    }

    async fn transcribe(&self, audio: AudioBlob) -> EngineResult<TranscriptText> {
        if audio.is_empty() {
            return Err(EngineError::Rejected("empty audio payload".to_string()));
        }
        TranscriptText::new(self.response.clone()).ok_or_else(no_speech)
    }

    fn health(&self) -> ComponentHealth {
        ComponentHealth::ok("Placeholder STT (no engine configured)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_wav_pcm16, AudioEncoding};

    fn wav_blob() -> AudioBlob {
        encode_wav_pcm16(&[0.0; 160], 16000).unwrap()
    }

    #[tokio::test]
    async fn placeholder_with_response() {
        let stt = PlaceholderStt::with_response("hello world");
        let text = stt.transcribe(wav_blob()).await.unwrap();
        assert_eq!(text.as_str(), "hello world");
    }

    #[tokio::test]
    async fn placeholder_rejects_empty_audio() {
        let stt = PlaceholderStt::new();
        let empty = AudioBlob::from_upload(Vec::new(), AudioEncoding::Wav);
        assert!(matches!(
            stt.transcribe(empty).await,
            Err(EngineError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn openai_without_key_is_unavailable() {
        let stt = OpenAiStt::new(OpenAiSttConfig::default()).unwrap();
        assert!(!stt.health().is_ok());
        assert!(matches!(
            stt.transcribe(wav_blob()).await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn whisper_cli_missing_model_is_unavailable() {
        let stt = WhisperCliStt::new(WhisperCliConfig {
            model_path: PathBuf::from("/nonexistent/ggml-small.bin"),
            ..WhisperCliConfig::default()
        });
        assert!(matches!(
            stt.transcribe(wav_blob()).await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn whisper_cli_rejects_corrupt_wav_before_spawning() {
        let stt = WhisperCliStt::new(WhisperCliConfig {
            binary: PathBuf::from("/nonexistent/whisper-cli"),
            ..WhisperCliConfig::default()
        });
        let corrupt = AudioBlob::from_upload(b"RIFF garbage".to_vec(), AudioEncoding::Wav);
        assert!(matches!(
            stt.transcribe(corrupt).await,
            Err(EngineError::Rejected(_))
        ));
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable shell script standing in for whisper-cli.
        fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
            let path = dir.join("whisper-cli");
            {
                let mut f = std::fs::File::create(&path).unwrap();
                writeln!(f, "#!/bin/sh").unwrap();
                f.write_all(body.as_bytes()).unwrap();
                f.sync_all().unwrap();
            }
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn config(dir: &std::path::Path, binary: PathBuf) -> WhisperCliConfig {
            let model = dir.join("ggml-test.bin");
            std::fs::write(&model, b"model").unwrap();
            WhisperCliConfig {
                binary,
                model_path: model,
                language: Some("en".to_string()),
                threads: None,
                max_concurrent: 2,
            }
        }

        #[tokio::test]
        async fn reads_txt_output() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then out="$2"; fi
  shift
done
printf ' What is the capital of France?\n' > "$out.txt"
"#,
            );
            let stt = WhisperCliStt::new(config(dir.path(), script));
            assert!(stt.health().is_ok());
            let text = stt.transcribe(wav_blob()).await.unwrap();
            assert_eq!(text.as_str(), "What is the capital of France?");
        }

        #[tokio::test]
        async fn blank_transcript_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then out="$2"; fi
  shift
done
printf '\n' > "$out.txt"
"#,
            );
            let stt = WhisperCliStt::new(config(dir.path(), script));
            assert!(matches!(
                stt.transcribe(wav_blob()).await,
                Err(EngineError::Rejected(_))
            ));
        }

        #[tokio::test]
        async fn failing_binary_is_internal() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "echo 'failed to read audio' >&2\nexit 1\n");
            let stt = WhisperCliStt::new(config(dir.path(), script));
            match stt.transcribe(wav_blob()).await {
                Err(EngineError::Internal(msg)) => assert!(msg.contains("failed to read audio")),
                other => panic!("expected Internal, got {:?}", other),
            }
        }

        /// Dead means gone from /proc or a zombie awaiting reaping.
        #[cfg(target_os = "linux")]
        fn process_is_dead(pid: &str) -> bool {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => true,
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .map(|rest| rest.trim_start().starts_with('Z'))
                    .unwrap_or(false),
            }
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn stage_timeout_kills_engine_process() {
            use crate::error::EngineErrorKind;
            use crate::stage::{run_stage, Stage, StageStatus};
            use std::time::Duration;

            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "echo $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30\n");
            let stt = WhisperCliStt::new(config(dir.path(), script));

            let (value, record) = run_stage(Stage::Stt, Duration::from_millis(500), || {
                stt.transcribe(wav_blob())
            })
            .await;
            assert!(value.is_none());
            assert_eq!(record.status(), StageStatus::Failed);
            assert_eq!(record.error().unwrap().kind, EngineErrorKind::EngineTimeout);

            let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
            let pid = pid.trim();
            let mut dead = false;
            for _ in 0..40 {
                if process_is_dead(pid) {
                    dead = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            assert!(dead, "engine process {} outlived its stage", pid);
        }
    }
}
