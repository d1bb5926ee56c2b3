//! # Voxchat Voice - speech in, speech out
//!
//! A batch voice pipeline: one uploaded utterance is transcribed, answered by a
//! language model and synthesized back to audio, with a timed record of every
//! stage.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      PipelineOrchestrator                        │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐        │
//! │  │  SttEngine   │ →  │  LlmEngine   │ →  │  TtsEngine   │        │
//! │  │ (whisper.cpp)│    │   (Gemini)   │    │   (Coqui)    │        │
//! │  └──────────────┘    └──────────────┘    └──────────────┘        │
//! │         ↓ run_stage: budget, timing, StageRecord per stage       │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │ assemble → PipelineResult (audio, records, texts, abort)   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failed stage aborts the request; nothing downstream runs.

pub mod audio;
pub mod error;
pub mod health;
mod http;
pub mod llm;
pub mod orchestrator;
mod process;
pub mod result;
pub mod stage;
pub mod stt;
pub mod text;
pub mod tts;

pub use audio::{encode_wav_pcm16, silence_wav, AudioBlob, AudioEncoding, AudioFormat};
pub use error::{EngineError, EngineErrorKind, EngineResult, VoiceError, VoiceResult};
pub use health::{ComponentHealth, HealthStatus, PipelineHealth};
pub use llm::{
    ConversationContext, ConversationTurn, GeminiConfig, GeminiLlm, LlmEngine, OpenRouterConfig,
    OpenRouterLlm, PlaceholderLlm, TurnRole, DEFAULT_SYSTEM_INSTRUCTION,
};
pub use orchestrator::{PipelineOrchestrator, PipelineState};
pub use result::{assemble, AudioSummary, PipelineAborted, PipelineResult, PipelineStatus};
pub use stage::{run_stage, Stage, StageError, StageRecord, StageStatus, StageTimeouts};
pub use stt::{
    OpenAiStt, OpenAiSttConfig, PlaceholderStt, SttEngine, WhisperCliConfig, WhisperCliStt,
};
#[cfg(feature = "whisper")]
pub use stt::WhisperStt;
pub use text::{ResponseText, TranscriptText};
pub use tts::{
    CoquiCliConfig, CoquiCliTts, OpenAiTts, OpenAiTtsConfig, PlaceholderTts, TtsEngine,
};
