//! Pipeline Orchestrator - drives STT → LLM → TTS for one request
//!
//! The orchestrator holds only the injected engines and budgets. Each call to
//! [`PipelineOrchestrator::process`] owns its own run state, so any number of
//! requests can go through one orchestrator concurrently.

use crate::audio::AudioBlob;
use crate::health::PipelineHealth;
use crate::llm::{ConversationContext, LlmEngine};
use crate::result::{assemble, PipelineResult, PipelineStatus};
use crate::stage::{run_stage, Stage, StageRecord, StageTimeouts};
use crate::stt::SttEngine;
use crate::text::{ResponseText, TranscriptText};
use crate::tts::TtsEngine;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Where a single request is in the pipeline.
///
/// `Completed` and `Aborted` are terminal; `Aborted` is reachable from every
/// running state and nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    RunningStt,
    RunningLlm,
    RunningTts,
    Completed,
    Aborted,
}

impl PipelineState {
    fn running(stage: Stage) -> Self {
        match stage {
            Stage::Stt => PipelineState::RunningStt,
            Stage::Llm => PipelineState::RunningLlm,
            Stage::Tts => PipelineState::RunningTts,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Aborted)
    }
}

/// Per-request bookkeeping. Lives only for the duration of one `process` call.
struct PipelineRun {
    request_id: Uuid,
    state: PipelineState,
    records: Vec<StageRecord>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            state: PipelineState::Idle,
            records: Vec::with_capacity(Stage::ORDER.len()),
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(!self.state.is_terminal(), "stage entered after terminal state");
        let next = PipelineState::running(stage);
        debug!(target: "voxchat::pipeline", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Append the stage's record. Returns `false` (and aborts) when it failed.
    fn record(&mut self, record: StageRecord) -> bool {
        let ok = record.is_success();
        self.records.push(record);
        if !ok {
            self.state = PipelineState::Aborted;
        }
        ok
    }

    /// Close the run. Only a run whose TTS stage succeeded completes.
    fn finish(self) -> (Uuid, PipelineStatus, Vec<StageRecord>) {
        let (terminal, status) = if self.state == PipelineState::RunningTts {
            (PipelineState::Completed, PipelineStatus::Completed)
        } else {
            (PipelineState::Aborted, PipelineStatus::Aborted)
        };
        debug!(target: "voxchat::pipeline", from = ?self.state, to = ?terminal, "state transition");
        (self.request_id, status, self.records)
    }
}

/// Voice pipeline: speech in, speech out.
///
/// Fail-fast: the first failed stage ends the request and later stages are
/// never attempted. No retries.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    stt: Arc<dyn SttEngine>,
    llm: Arc<dyn LlmEngine>,
    tts: Arc<dyn TtsEngine>,
    timeouts: StageTimeouts,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("stt", &self.stt.name())
            .field("llm", &self.llm.name())
            .field("tts", &self.tts.name())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        stt: Arc<dyn SttEngine>,
        llm: Arc<dyn LlmEngine>,
        tts: Arc<dyn TtsEngine>,
        timeouts: StageTimeouts,
    ) -> Self {
        info!(
            target: "voxchat::pipeline",
            stt = stt.name(),
            llm = llm.name(),
            tts = tts.name(),
            "🎙️ Voice pipeline ready"
        );
        Self {
            stt,
            llm,
            tts,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> StageTimeouts {
        self.timeouts
    }

    /// Engine names in stage order.
    pub fn engine_names(&self) -> [&str; 3] {
        [self.stt.name(), self.llm.name(), self.tts.name()]
    }

    /// Health of every engine, without running inference.
    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            stt: self.stt.health(),
            llm: self.llm.health(),
            tts: self.tts.health(),
        }
    }

    /// Run one request through STT → LLM → TTS.
    pub async fn process(&self, audio: AudioBlob) -> PipelineResult {
        self.process_with_context(audio, None).await
    }

    /// Like [`process`](Self::process), with prior turns handed to the LLM stage.
    pub async fn process_with_context(
        &self,
        audio: AudioBlob,
        context: Option<&ConversationContext>,
    ) -> PipelineResult {
        let run = PipelineRun::new();
        let span = tracing::info_span!("pipeline", request_id = %run.request_id);
        self.drive(run, audio, context).instrument(span).await
    }

    async fn drive(
        &self,
        mut run: PipelineRun,
        audio: AudioBlob,
        context: Option<&ConversationContext>,
    ) -> PipelineResult {
        info!(
            target: "voxchat::pipeline",
            bytes = audio.len(),
            encoding = audio.format().encoding.extension(),
            "request received"
        );

        run.enter(Stage::Stt);
        let (transcript, record) = run_stage(Stage::Stt, self.timeouts.stt, || {
            self.stt.transcribe(audio)
        })
        .await;
        let transcript = match (run.record(record), transcript) {
            (true, Some(value)) => value,
            _ => return self.abort(run, None, None),
        };

        run.enter(Stage::Llm);
        let prompt = transcript.clone();
        let (response, record) = run_stage(Stage::Llm, self.timeouts.llm, || {
            self.llm.generate(prompt, context)
        })
        .await;
        let response = match (run.record(record), response) {
            (true, Some(value)) => value,
            _ => return self.abort(run, Some(transcript), None),
        };

        run.enter(Stage::Tts);
        let text = response.clone();
        let (speech, record) = run_stage(Stage::Tts, self.timeouts.tts, || {
            self.tts.synthesize(text)
        })
        .await;
        let speech = match (run.record(record), speech) {
            (true, Some(value)) => value,
            _ => return self.abort(run, Some(transcript), Some(response)),
        };

        let (request_id, status, records) = run.finish();
        let result = assemble(
            request_id,
            status,
            records,
            Some(speech),
            Some(transcript),
            Some(response),
        );
        info!(
            target: "voxchat::pipeline",
            total_ms = result.total_duration().as_secs_f64() * 1000.0,
            "✅ pipeline completed"
        );
        result
    }

    fn abort(
        &self,
        run: PipelineRun,
        transcript: Option<TranscriptText>,
        response: Option<ResponseText>,
    ) -> PipelineResult {
        let (request_id, status, records) = run.finish();
        let result = assemble(request_id, status, records, None, transcript, response);
        if let Some(aborted) = result.aborted() {
            warn!(
                target: "voxchat::pipeline",
                failed_stage = %aborted.failed_stage,
                kind = %aborted.error.kind,
                "pipeline aborted"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav_pcm16;
    use crate::llm::PlaceholderLlm;
    use crate::stt::PlaceholderStt;
    use crate::tts::PlaceholderTts;

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Completed.is_terminal());
        assert!(PipelineState::Aborted.is_terminal());
        assert!(!PipelineState::RunningLlm.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());
    }

    #[test]
    fn run_without_tts_finishes_aborted() {
        let mut run = PipelineRun::new();
        run.enter(Stage::Stt);
        let (_, status, records) = run.finish();
        assert_eq!(status, PipelineStatus::Aborted);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn placeholders_complete() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(PlaceholderStt::new()),
            Arc::new(PlaceholderLlm::new()),
            Arc::new(PlaceholderTts),
            StageTimeouts::default(),
        );
        assert!(orchestrator.health().all_ok());
        let audio = encode_wav_pcm16(&[0.0; 1600], 16000).unwrap();
        let result = orchestrator.process(audio).await;
        assert!(result.is_completed());
        assert_eq!(result.stages().len(), 3);
        assert!(result.audio().is_some());
    }
}
