//! Builds the pipeline's engines from the configured backends.

use crate::config::{GatewayConfig, LlmBackend, SttBackend, TtsBackend};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use voxchat_voice::{
    CoquiCliTts, GeminiLlm, LlmEngine, OpenAiStt, OpenAiTts, OpenRouterLlm, PipelineOrchestrator,
    PlaceholderLlm, PlaceholderStt, PlaceholderTts, SttEngine, TtsEngine, WhisperCliStt,
};

pub fn build_stt(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn SttEngine>> {
    let engine: Arc<dyn SttEngine> = match cfg.stt.backend {
        SttBackend::WhisperCli => Arc::new(WhisperCliStt::new(cfg.stt.whisper_cli.clone())),
        SttBackend::OpenAi => Arc::new(
            OpenAiStt::new(cfg.stt.openai.clone()).context("building OpenAI-compatible STT")?,
        ),
        SttBackend::Whisper => build_local_whisper(cfg)?,
        SttBackend::Placeholder => Arc::new(PlaceholderStt::new()),
    };
    Ok(engine)
}

#[cfg(feature = "whisper")]
fn build_local_whisper(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn SttEngine>> {
    let local = &cfg.stt.whisper;
    let stt = voxchat_voice::WhisperStt::new(local.model_path.clone(), local.language.clone())
        .with_context(|| format!("loading Whisper model {}", local.model_path.display()))?;
    Ok(Arc::new(stt))
}

#[cfg(not(feature = "whisper"))]
fn build_local_whisper(_cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn SttEngine>> {
    anyhow::bail!("stt.backend = \"whisper\" requires building voxchat-gateway with --features whisper")
}

pub fn build_llm(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn LlmEngine>> {
    let engine: Arc<dyn LlmEngine> = match cfg.llm.backend {
        LlmBackend::Gemini => {
            Arc::new(GeminiLlm::new(cfg.llm.gemini.clone()).context("building Gemini client")?)
        }
        LlmBackend::Openrouter => Arc::new(
            OpenRouterLlm::new(cfg.llm.openrouter.clone()).context("building OpenRouter client")?,
        ),
        LlmBackend::Placeholder => Arc::new(PlaceholderLlm::new()),
    };
    Ok(engine)
}

pub fn build_tts(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn TtsEngine>> {
    let engine: Arc<dyn TtsEngine> = match cfg.tts.backend {
        TtsBackend::Coqui => Arc::new(CoquiCliTts::new(cfg.tts.coqui.clone())),
        TtsBackend::OpenAi => Arc::new(
            OpenAiTts::new(cfg.tts.openai.clone()).context("building OpenAI-compatible TTS")?,
        ),
        TtsBackend::Placeholder => Arc::new(PlaceholderTts),
    };
    Ok(engine)
}

/// Wire the configured engines into an orchestrator and log their health.
///
/// Unhealthy engines are only warned about: requests will fail at that stage
/// with `EngineUnavailable` until the engine is fixed.
pub fn build_orchestrator(cfg: &GatewayConfig) -> anyhow::Result<PipelineOrchestrator> {
    let timeouts = cfg
        .timeouts
        .stage_timeouts()
        .map_err(anyhow::Error::msg)
        .context("invalid [timeouts] section")?;
    let orchestrator =
        PipelineOrchestrator::new(build_stt(cfg)?, build_llm(cfg)?, build_tts(cfg)?, timeouts);

    let health = orchestrator.health();
    for (stage, component) in [("STT", &health.stt), ("LLM", &health.llm), ("TTS", &health.tts)] {
        if component.is_ok() {
            info!(target: "voxchat::gateway", "{}: {}", stage, component.message);
        } else {
            warn!(target: "voxchat::gateway", "{} not ready: {}", stage, component.message);
        }
    }
    Ok(orchestrator)
}
