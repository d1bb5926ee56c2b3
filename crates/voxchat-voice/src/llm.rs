//! **Language model (LLM)**: turn a [`TranscriptText`] into a [`ResponseText`].
//!
//! Engines: Google Gemini (`generateContent`), any OpenAI-compatible
//! `/chat/completions` endpoint (OpenRouter by default) and a fixed-text placeholder.
//! A [`ConversationContext`] may be passed through; nothing here stores one.

use crate::error::{EngineError, EngineResult, VoiceResult};
use crate::health::ComponentHealth;
use crate::http::{build_client, classify_transport, error_from_response};
use crate::text::{ResponseText, TranscriptText};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default system instruction: short spoken answers.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a responsive, fluent voice assistant. \
Answer the user's spoken question clearly and politely in at most 2-3 short sentences. \
Do not repeat the question; answer directly. \
If you are unsure of an answer, say honestly that you don't know.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Prior turns handed to the LLM, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Language model engine. Implementations hold no conversation state.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: TranscriptText,
        context: Option<&ConversationContext>,
    ) -> EngineResult<ResponseText>;

    fn health(&self) -> ComponentHealth;
}

fn require_key<'a>(key: &'a Option<String>, what: &str) -> EngineResult<&'a str> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| EngineError::Unavailable(format!("{} API key not configured", what)))
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

// -----------------------------------------------------------------------------
// Gemini
// -----------------------------------------------------------------------------

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            system_instruction: default_system_instruction(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn gemini_content(role: &str, text: &str) -> GeminiContent {
    GeminiContent {
        role: Some(role.to_string()),
        parts: vec![GeminiPart {
            text: text.to_string(),
        }],
    }
}

/// Pull the answer out of a `generateContent` response body.
/// Safety blocks are `Rejected`; a response with no text is `Internal`.
fn extract_gemini_text(body: &str) -> EngineResult<ResponseText> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| EngineError::Internal(format!("Gemini response parse failed: {}", e)))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(EngineError::Rejected(format!("Gemini blocked the prompt: {}", reason)));
    }
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::Internal("Gemini returned no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    match ResponseText::new(text) {
        Some(t) => Ok(t),
        None => match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => Err(
                EngineError::Rejected("Gemini withheld the answer for safety".to_string()),
            ),
            reason => Err(EngineError::Internal(format!(
                "Gemini returned an empty answer (finish reason {})",
                reason.unwrap_or("unknown")
            ))),
        },
    }
}

/// Google Gemini via the `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiLlm {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiLlm {
    pub fn new(config: GeminiConfig) -> VoiceResult<Self> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    fn request_body(
        &self,
        prompt: &TranscriptText,
        context: Option<&ConversationContext>,
    ) -> GenerateContentRequest {
        let mut contents: Vec<GeminiContent> = context
            .map(|ctx| {
                ctx.turns()
                    .iter()
                    .map(|t| {
                        let role = match t.role {
                            TurnRole::User => "user",
                            TurnRole::Assistant => "model",
                        };
                        gemini_content(role, &t.text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        contents.push(gemini_content("user", prompt.as_str()));

        let system = self.config.system_instruction.trim();
        let generation_config =
            if self.config.temperature.is_some() || self.config.max_output_tokens.is_some() {
                Some(GenerationConfig {
                    temperature: self.config.temperature,
                    max_output_tokens: self.config.max_output_tokens,
                })
            } else {
                None
            };
        GenerateContentRequest {
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
            }),
            contents,
            generation_config,
        }
    }
}

#[async_trait]
impl LlmEngine for GeminiLlm {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: TranscriptText,
        context: Option<&ConversationContext>,
    ) -> EngineResult<ResponseText> {
        let api_key = require_key(&self.config.api_key, "Gemini")?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = self.request_body(&prompt, context);

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("Gemini", e))?;
        if !res.status().is_success() {
            return Err(error_from_response("Gemini", res).await);
        }
        let text = res
            .text()
            .await
            .map_err(|e| EngineError::Internal(format!("Gemini response read failed: {}", e)))?;
        let answer = extract_gemini_text(&text)?;
        debug!(target: "voxchat::llm", model = %self.config.model, chars = answer.as_str().len(), "Gemini answered");
        Ok(answer)
    }

    fn health(&self) -> ComponentHealth {
        match require_key(&self.config.api_key, "Gemini") {
            Ok(_) => ComponentHealth::ok(format!("API key configured ({})", self.config.model)),
            Err(_) => ComponentHealth::error("GEMINI_API_KEY not configured"),
        }
    }
}

// -----------------------------------------------------------------------------
// OpenRouter / OpenAI-compatible chat completions
// -----------------------------------------------------------------------------

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_openrouter_model() -> String {
    "meta-llama/llama-3.3-70b-instruct".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.3)
}

fn default_max_tokens() -> Option<u32> {
    Some(256)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openrouter_model")]
    pub model: String,
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_openrouter_model(),
            base_url: default_openrouter_base_url(),
            system_instruction: default_system_instruction(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

// OpenAI-compatible request/response
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions over OpenRouter or any OpenAI-compatible server.
#[derive(Debug, Clone)]
pub struct OpenRouterLlm {
    config: OpenRouterConfig,
    client: reqwest::Client,
}

impl OpenRouterLlm {
    pub fn new(config: OpenRouterConfig) -> VoiceResult<Self> {
        Ok(Self {
            config,
            client: build_client()?,
        })
    }

    fn messages(
        &self,
        prompt: &TranscriptText,
        context: Option<&ConversationContext>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        let system = self.config.system_instruction.trim();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        if let Some(ctx) = context {
            messages.extend(ctx.turns().iter().map(|t| ChatMessage {
                role: match t.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                content: t.text.clone(),
            }));
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.as_str().to_string(),
        });
        messages
    }
}

#[async_trait]
impl LlmEngine for OpenRouterLlm {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(
        &self,
        prompt: TranscriptText,
        context: Option<&ConversationContext>,
    ) -> EngineResult<ResponseText> {
        let api_key = require_key(&self.config.api_key, "OpenRouter")?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: self.messages(&prompt, context),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://voxchat.local")
            .header("X-Title", "voxchat")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("OpenRouter", e))?;
        if !res.status().is_success() {
            return Err(error_from_response("OpenRouter", res).await);
        }
        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| EngineError::Internal(format!("OpenRouter response parse failed: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .and_then(ResponseText::new)
            .ok_or_else(|| EngineError::Internal("OpenRouter returned an empty answer".to_string()))
    }

    fn health(&self) -> ComponentHealth {
        match require_key(&self.config.api_key, "OpenRouter") {
            Ok(_) => ComponentHealth::ok(format!("API key configured ({})", self.config.model)),
            Err(_) => ComponentHealth::error("OPENROUTER_API_KEY not configured"),
        }
    }
}

// -----------------------------------------------------------------------------
// Placeholder
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlaceholderLlm {
    response: String,
}

impl Default for PlaceholderLlm {
    fn default() -> Self {
        Self {
            response: "[LLM placeholder response]".to_string(),
        }
    }
}

impl PlaceholderLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self { response: s.into() }
    }
}

#[async_trait]
impl LlmEngine for PlaceholderLlm {
    fn name(&self) -> &str {
        "placeholder-llm"
    }

    async fn generate(
        &self,
        _prompt: TranscriptText,
        _context: Option<&ConversationContext>,
    ) -> EngineResult<ResponseText> {
        ResponseText::new(self.response.clone())
            .ok_or_else(|| EngineError::Internal("placeholder response is empty".to_string()))
    }

    fn health(&self) -> ComponentHealth {
        ComponentHealth::ok("Placeholder LLM (no engine configured)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(s: &str) -> TranscriptText {
        TranscriptText::new(s).unwrap()
    }

    #[test]
    fn gemini_text_from_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Paris "},{"text":"is the capital."}]},"finishReason":"STOP"}]}"#;
        assert_eq!(
            extract_gemini_text(body).unwrap().as_str(),
            "Paris is the capital."
        );
    }

    #[test]
    fn gemini_block_is_rejected() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(extract_gemini_text(body), Err(EngineError::Rejected(_))));

        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert!(matches!(extract_gemini_text(body), Err(EngineError::Rejected(_))));
    }

    #[test]
    fn gemini_empty_is_internal() {
        assert!(matches!(
            extract_gemini_text(r#"{"candidates":[]}"#),
            Err(EngineError::Internal(_))
        ));
        assert!(matches!(
            extract_gemini_text("not json"),
            Err(EngineError::Internal(_))
        ));
    }

    #[test]
    fn gemini_request_maps_roles_and_system_instruction() {
        let llm = GeminiLlm::new(GeminiConfig::default()).unwrap();
        let mut ctx = ConversationContext::new();
        ctx.push(TurnRole::User, "Hi");
        ctx.push(TurnRole::Assistant, "Hello!");
        let body = serde_json::to_value(llm.request_body(&prompt("What time is it?"), Some(&ctx))).unwrap();

        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("voice assistant"));
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(body["contents"][2]["parts"][0]["text"], "What time is it?");
        assert!(body.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn missing_keys_are_unavailable() {
        let gemini = GeminiLlm::new(GeminiConfig::default()).unwrap();
        assert!(!gemini.health().is_ok());
        assert!(matches!(
            gemini.generate(prompt("hello"), None).await,
            Err(EngineError::Unavailable(_))
        ));

        let openrouter = OpenRouterLlm::new(OpenRouterConfig {
            api_key: Some("   ".to_string()),
            ..OpenRouterConfig::default()
        })
        .unwrap();
        assert!(matches!(
            openrouter.generate(prompt("hello"), None).await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn openrouter_messages_order() {
        let llm = OpenRouterLlm::new(OpenRouterConfig::default()).unwrap();
        let mut ctx = ConversationContext::new();
        ctx.push(TurnRole::Assistant, "Earlier answer");
        let msgs = llm.messages(&prompt("Next question"), Some(&ctx));
        let roles: Vec<&str> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "assistant", "user"]);
        assert_eq!(msgs[2].content, "Next question");
    }

    #[tokio::test]
    async fn placeholder_returns_fixed_text() {
        let llm = PlaceholderLlm::with_response("Paris.");
        let out = llm.generate(prompt("capital of France?"), None).await.unwrap();
        assert_eq!(out.as_str(), "Paris.");
    }
}
