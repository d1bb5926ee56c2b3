//! Example: one pass through the voice pipeline from the command line.
//!
//! ```text
//! cargo run -p voxchat-voice --example run_pipeline -- question.wav answer.wav
//! cargo run -p voxchat-voice --example run_pipeline -- --placeholder question.wav answer.wav
//! ```
//!
//! Without `--placeholder` this uses whisper.cpp, Gemini (`GEMINI_API_KEY`) and
//! Coqui with their default paths, relative to the current directory.

use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use voxchat_voice::{
    AudioBlob, AudioEncoding, CoquiCliConfig, CoquiCliTts, GeminiConfig, GeminiLlm, LlmEngine,
    PipelineOrchestrator, PlaceholderLlm, PlaceholderStt, PlaceholderTts, StageTimeouts,
    SttEngine, TtsEngine, WhisperCliConfig, WhisperCliStt,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = dotenvy::dotenv();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let placeholder = if let Some(pos) = args.iter().position(|a| a == "--placeholder") {
        args.remove(pos);
        true
    } else {
        false
    };
    let (input, output) = match args.as_slice() {
        [input, output] => (input.clone(), output.clone()),
        _ => {
            eprintln!("usage: run_pipeline [--placeholder] <input audio> <output.wav>");
            std::process::exit(2);
        }
    };

    let encoding = AudioEncoding::from_filename(&input)
        .ok_or("input must be .wav, .mp3, .ogg or .m4a")?;
    let audio = AudioBlob::from_upload(std::fs::read(&input)?, encoding);

    let (stt, llm, tts): (Arc<dyn SttEngine>, Arc<dyn LlmEngine>, Arc<dyn TtsEngine>) =
        if placeholder {
            (
                Arc::new(PlaceholderStt::with_response("What is the capital of France?")),
                Arc::new(PlaceholderLlm::with_response("Paris.")),
                Arc::new(PlaceholderTts),
            )
        } else {
            let gemini = GeminiConfig {
                api_key: std::env::var("GEMINI_API_KEY").ok(),
                ..GeminiConfig::default()
            };
            (
                Arc::new(WhisperCliStt::new(WhisperCliConfig::default())),
                Arc::new(GeminiLlm::new(gemini)?),
                Arc::new(CoquiCliTts::new(CoquiCliConfig::default())),
            )
        };

    let orchestrator = PipelineOrchestrator::new(stt, llm, tts, StageTimeouts::default());
    let health = orchestrator.health();
    if !health.all_ok() {
        warn!("Some engines look unavailable: {:?}", health);
    }

    let mut result = orchestrator.process(audio).await;
    info!("{}", serde_json::to_string_pretty(&result)?);

    match result.take_audio() {
        Some(speech) => {
            std::fs::write(&output, speech.bytes())?;
            info!("✅ Answer written to {}", output);
            Ok(())
        }
        None => Err("pipeline aborted; no audio produced".into()),
    }
}
