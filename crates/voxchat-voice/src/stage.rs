//! Stage executor: runs one engine call under a time budget and records what happened.

use crate::error::{EngineError, EngineErrorKind, EngineResult};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Stt,
    Llm,
    Tts,
}

impl Stage {
    pub const ORDER: [Stage; 3] = [Stage::Stt, Stage::Llm, Stage::Tts];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Stt => "STT",
            Stage::Llm => "LLM",
            Stage::Tts => "TTS",
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Stt => Some(Stage::Llm),
            Stage::Llm => Some(Stage::Tts),
            Stage::Tts => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
}

/// Serializable form of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl From<&EngineError> for StageError {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one attempted stage. Written once by the executor, then read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    stage: Stage,
    status: StageStatus,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StageError>,
    started_at: DateTime<Utc>,
}

impl StageRecord {
    pub(crate) fn success(stage: Stage, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            duration,
            error: None,
            started_at,
        }
    }

    pub(crate) fn failed(
        stage: Stage,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: StageError,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            duration,
            error: Some(error),
            started_at,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error(&self) -> Option<&StageError> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Per-stage time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub stt: Duration,
    pub llm: Duration,
    pub tts: Duration,
}

impl StageTimeouts {
    pub fn new(stt: Duration, llm: Duration, tts: Duration) -> Self {
        Self { stt, llm, tts }
    }

    /// Same budget for every stage.
    pub fn uniform(budget: Duration) -> Self {
        Self::new(budget, budget, budget)
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Stt => self.stt,
            Stage::Llm => self.llm,
            Stage::Tts => self.tts,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            stt: Duration::from_secs(120),
            llm: Duration::from_secs(60),
            tts: Duration::from_secs(120),
        }
    }
}

/// Run one engine call, timed with a monotonic clock and bounded by `budget`.
///
/// Never fails: errors, timeouts and panics all become a `Failed` record.
/// On timeout the call's future is dropped, which releases whatever it owns
/// (child processes, scratch directories, HTTP connections).
pub async fn run_stage<T, F, Fut>(stage: Stage, budget: Duration, call: F) -> (Option<T>, StageRecord)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let started_at = Utc::now();
    let start = Instant::now();

    let guarded = AssertUnwindSafe(async move { call().await }).catch_unwind();
    let outcome: EngineResult<T> = match tokio::time::timeout(budget, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(EngineError::Internal(format!(
            "engine panicked: {}",
            panic_message(panic.as_ref())
        ))),
        Err(_) => Err(EngineError::Timeout(budget)),
    };
    let duration = start.elapsed();

    match outcome {
        Ok(value) => {
            info!(
                target: "voxchat::stage",
                stage = %stage,
                duration_ms = duration.as_secs_f64() * 1000.0,
                "stage succeeded"
            );
            (Some(value), StageRecord::success(stage, started_at, duration))
        }
        Err(err) => {
            warn!(
                target: "voxchat::stage",
                stage = %stage,
                kind = %err.kind(),
                duration_ms = duration.as_secs_f64() * 1000.0,
                error = %err,
                "stage failed"
            );
            let error = StageError::from(&err);
            (None, StageRecord::failed(stage, started_at, duration, error))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `Duration` as fractional milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).map_err(serde::de::Error::custom)
    }
}
