//! Error types for the Voxchat voice pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for a single engine call
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for adapter construction and wiring
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Classified failure of one engine call.
///
/// Every adapter maps its engine-specific failures (subprocess exit codes, HTTP
/// statuses, model errors) onto exactly one of these kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Process, binary, model file, credential or remote API not reachable.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed input, quota, auth or content policy.
    #[error("Engine rejected input: {0}")]
    Rejected(String),

    #[error("Engine internal error: {0}")]
    Internal(String),
}

/// Serializable tag for an [`EngineError`], used in stage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineErrorKind {
    EngineUnavailable,
    EngineTimeout,
    EngineRejected,
    EngineInternal,
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::Unavailable(_) => EngineErrorKind::EngineUnavailable,
            EngineError::Timeout(_) => EngineErrorKind::EngineTimeout,
            EngineError::Rejected(_) => EngineErrorKind::EngineRejected,
            EngineError::Internal(_) => EngineErrorKind::EngineInternal,
        }
    }
}

impl std::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineErrorKind::EngineUnavailable => "EngineUnavailable",
            EngineErrorKind::EngineTimeout => "EngineTimeout",
            EngineErrorKind::EngineRejected => "EngineRejected",
            EngineErrorKind::EngineInternal => "EngineInternal",
        };
        f.write_str(s)
    }
}

/// Errors raised while building adapters (bad configuration, client setup, model load).
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        VoiceError::HttpClient(err.to_string())
    }
}
