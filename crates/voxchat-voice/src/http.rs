//! Shared plumbing for HTTP-backed engines: client construction and mapping of
//! transport failures / status codes onto [`EngineError`].

use crate::error::{EngineError, VoiceResult};
use reqwest::StatusCode;
use std::time::Duration;

/// Upper bound on a single HTTP exchange. Stage budgets are normally tighter;
/// this only stops a client from hanging forever when used outside the pipeline.
pub(crate) const CLIENT_TIMEOUT: Duration = Duration::from_secs(180);

const BODY_PREVIEW_CHARS: usize = 300;

pub(crate) fn build_client() -> VoiceResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?)
}

/// Classify a non-success HTTP response.
pub(crate) fn classify_status(engine: &str, status: StatusCode, body: &str) -> EngineError {
    let detail = format!("{} API error {}: {}", engine, status, preview(body));
    match status.as_u16() {
        400 | 401 | 403 | 413 | 415 | 422 | 429 => EngineError::Rejected(detail),
        404 | 502 | 503 | 504 => EngineError::Unavailable(detail),
        _ => EngineError::Internal(detail),
    }
}

/// Classify a transport-level `reqwest` failure.
pub(crate) fn classify_transport(engine: &str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout(CLIENT_TIMEOUT)
    } else if err.is_connect() {
        EngineError::Unavailable(format!("{} unreachable: {}", engine, err))
    } else if err.is_builder() {
        EngineError::Rejected(format!("{} request could not be built: {}", engine, err))
    } else {
        EngineError::Internal(format!("{} request failed: {}", engine, err))
    }
}

/// Read the body of a failed response and classify it.
pub(crate) async fn error_from_response(engine: &str, res: reqwest::Response) -> EngineError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    classify_status(engine, status, &body)
}

fn preview(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{}…", cut)
    }
}
