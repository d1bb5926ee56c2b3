//! Response assembler: packages one request's outcome into a [`PipelineResult`].

use crate::audio::{AudioBlob, AudioEncoding};
use crate::stage::{duration_ms, Stage, StageError, StageRecord};
use crate::text::{ResponseText, TranscriptText};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Completed,
    Aborted,
}

/// Why and where a request stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineAborted {
    pub failed_stage: Stage,
    pub error: StageError,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

/// Metadata about the synthesized answer, serialized in place of the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioSummary {
    pub encoding: AudioEncoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    pub bytes: usize,
}

impl AudioSummary {
    fn of(audio: &AudioBlob) -> Self {
        let format = audio.format();
        Self {
            encoding: format.encoding,
            sample_rate: format.sample_rate,
            channels: format.channels,
            bytes: audio.len(),
        }
    }
}

/// Everything a caller gets back from one pipeline run.
///
/// JSON form carries the stage records, texts and abort diagnostics with
/// durations in milliseconds. The audio bytes themselves are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    request_id: Uuid,
    status: PipelineStatus,
    stages: Vec<StageRecord>,
    #[serde(rename = "total_duration_ms", with = "duration_ms")]
    total_duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<TranscriptText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<ResponseText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<PipelineAborted>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio: Option<AudioSummary>,
    #[serde(skip)]
    audio: Option<AudioBlob>,
}

impl PipelineResult {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Sum of the recorded stage durations.
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn transcript(&self) -> Option<&TranscriptText> {
        self.transcript.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseText> {
        self.response.as_ref()
    }

    pub fn aborted(&self) -> Option<&PipelineAborted> {
        self.aborted.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioBlob> {
        self.audio.as_ref()
    }

    /// Take the synthesized audio, leaving the diagnostics in place.
    pub fn take_audio(&mut self) -> Option<AudioBlob> {
        self.audio.take()
    }

    /// Compact JSON diagnostics (what the HTTP surface puts in `X-Process-Info`).
    pub fn process_info(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Build the result for a finished run.
///
/// `Completed` keeps the audio; `Aborted` drops it and derives the abort
/// diagnostics from the last (failed) record.
pub fn assemble(
    request_id: Uuid,
    status: PipelineStatus,
    stages: Vec<StageRecord>,
    audio: Option<AudioBlob>,
    transcript: Option<TranscriptText>,
    response: Option<ResponseText>,
) -> PipelineResult {
    let total_duration = stages.iter().map(StageRecord::duration).sum();

    let aborted = match status {
        PipelineStatus::Completed => None,
        PipelineStatus::Aborted => stages.iter().rev().find(|r| !r.is_success()).map(|r| {
            PipelineAborted {
                failed_stage: r.stage(),
                error: r.error().cloned().unwrap_or_else(|| StageError {
                    kind: crate::error::EngineErrorKind::EngineInternal,
                    message: "stage failed without detail".to_string(),
                }),
                duration: r.duration(),
            }
        }),
    };
    let audio = match status {
        PipelineStatus::Completed => audio,
        PipelineStatus::Aborted => None,
    };

    PipelineResult {
        request_id,
        status,
        stages,
        total_duration,
        transcript,
        response,
        aborted,
        output_audio: audio.as_ref().map(AudioSummary::of),
        audio,
    }
}
