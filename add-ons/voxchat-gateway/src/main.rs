//! Voxchat Gateway: speak a question, get a spoken answer.
//!
//! Upload a recording to `POST /voice-chat`; it goes through STT → LLM → TTS and
//! the synthesized answer comes back as audio. `GET /status` reports whether each
//! engine is usable.

mod config;
mod engines;
mod error;
mod logging;
mod routes;

use anyhow::Context;
use config::GatewayConfig;
use routes::AppState;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so API keys are visible to the config loader.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[voxchat-gateway] .env not loaded: {} (using system environment)", e);
    }

    let cfg = GatewayConfig::load().context("loading gateway configuration")?;
    let _log_guard = logging::init(&cfg.server.log_dir)?;

    let orchestrator = engines::build_orchestrator(&cfg)?;
    let app = routes::router(AppState::new(orchestrator), cfg.server.max_upload_bytes);

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(target: "voxchat::gateway", "🎙️ Voxchat gateway listening on http://{}", addr);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    // In-flight requests are dropped on Ctrl+C; their engine processes die with them.
    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "voxchat::gateway", "Shutdown initiated (Ctrl+C received)");
        }
    }
    tracing::info!(target: "voxchat::gateway", "✓ Shutdown complete");
    Ok(())
}
