//! HTTP surface: health, engine status, the browser page and the voice-chat endpoints.

use crate::error::GatewayError;
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use voxchat_voice::{AudioBlob, AudioEncoding, PipelineOrchestrator, PipelineResult};

pub const PROCESS_INFO_HEADER: &str = "x-process-info";
const AUDIO_FIELD: &str = "audio";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(PROCESS_INFO_HEADER)]);

    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/voice-chat", post(voice_chat))
        .route("/api/v1/voice-chat", post(voice_chat_json))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(middleware::from_fn(log_request))
        .layer(cors)
}

async fn log_request(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        target: "voxchat::http",
        client = connect_info.map(|ConnectInfo(addr)| addr.to_string()).unwrap_or_default(),
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "request"
    );
    response
}

/// Browser client: record or pick a file, play the answer, show stage timings.
async fn serve_index() -> Html<&'static str> {
    const INDEX: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html"));
    Html(INDEX)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "message": "Voice Chatbot API is running",
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "api": "online",
        "components": state.orchestrator.health(),
    }))
}

/// POST /voice-chat: answer as a WAV body with diagnostics in `X-Process-Info`;
/// an aborted pipeline returns 502 with the JSON result.
async fn voice_chat(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, GatewayError> {
    let audio = read_audio_upload(multipart).await?;
    let mut result = state.orchestrator.process(audio).await;

    let speech = match result.take_audio() {
        Some(speech) if result.is_completed() => speech,
        _ => return Ok(aborted_response(result)),
    };
    let info = result
        .process_info()
        .map_err(|e| GatewayError::Encode(e.to_string()))?;
    let info = HeaderValue::from_str(&ascii_json(&info))
        .map_err(|e| GatewayError::Encode(e.to_string()))?;
    let encoding = speech.format().encoding;
    let disposition = format!("attachment; filename=\"response.{}\"", encoding.extension());

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(encoding.mime_type())),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition).map_err(|e| GatewayError::Encode(e.to_string()))?,
            ),
            (HeaderName::from_static(PROCESS_INFO_HEADER), info),
        ],
        speech.into_bytes(),
    )
        .into_response())
}

/// POST /api/v1/voice-chat: same pipeline, JSON result only.
async fn voice_chat_json(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, GatewayError> {
    let audio = read_audio_upload(multipart).await?;
    let result = state.orchestrator.process(audio).await;
    if result.is_completed() {
        Ok((StatusCode::OK, Json(result)).into_response())
    } else {
        Ok(aborted_response(result))
    }
}

fn aborted_response(result: PipelineResult) -> Response {
    (StatusCode::BAD_GATEWAY, Json(result)).into_response()
}

/// Pull the `audio` field out of the form. The file name's extension decides the encoding.
async fn read_audio_upload(mut multipart: Multipart) -> Result<AudioBlob, GatewayError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let encoding = field
            .file_name()
            .and_then(AudioEncoding::from_filename)
            .ok_or(GatewayError::UnsupportedFormat)?;
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(GatewayError::EmptyUpload);
        }
        return Ok(AudioBlob::from_upload(bytes.to_vec(), encoding));
    }
    Err(GatewayError::MissingAudio)
}

/// JSON with every non-ASCII character (and DEL, which header values reject)
/// written as a `\uXXXX` escape, so it can travel in an HTTP header.
pub fn ascii_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tower::ServiceExt;
    use voxchat_voice::{
        encode_wav_pcm16, ComponentHealth, EngineError, EngineResult, PlaceholderLlm,
        PlaceholderStt, PlaceholderTts, StageTimeouts, SttEngine, TranscriptText,
    };

    const BOUNDARY: &str = "voxchat-test-boundary";

    struct RejectingStt;

    #[async_trait]
    impl SttEngine for RejectingStt {
        fn name(&self) -> &str {
            "rejecting-stt"
        }

        async fn transcribe(&self, _audio: AudioBlob) -> EngineResult<TranscriptText> {
            Err(EngineError::Rejected("audio payload is not a decodable WAV stream".into()))
        }

        fn health(&self) -> ComponentHealth {
            ComponentHealth::error("Binary exists: false")
        }
    }

    fn app_with(stt: Arc<dyn SttEngine>, max_upload_bytes: usize) -> Router {
        let orchestrator = PipelineOrchestrator::new(
            stt,
            Arc::new(PlaceholderLlm::with_response("Ibukota Prancis adalah Paris.")),
            Arc::new(PlaceholderTts),
            StageTimeouts::default(),
        );
        router(AppState::new(orchestrator), max_upload_bytes)
    }

    fn app() -> Router {
        app_with(
            Arc::new(PlaceholderStt::with_response("Apa ibukota Prancis?")),
            1024 * 1024,
        )
    }

    fn wav_bytes() -> Vec<u8> {
        encode_wav_pcm16(&[0.0; 800], 16000).unwrap().into_bytes()
    }

    fn multipart_request(uri: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                f = field,
                n = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_online() {
        let res = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = json_body(res).await;
        assert_eq!(json["status"], "online");
        assert_eq!(json["message"], "Voice Chatbot API is running");
    }

    #[tokio::test]
    async fn index_serves_html() {
        let res = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let ct = res.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(ct.starts_with("text/html"));
    }

    #[tokio::test]
    async fn status_reports_each_component() {
        let res = app_with(Arc::new(RejectingStt), 1024)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(res).await;
        assert_eq!(json["api"], "online");
        assert_eq!(json["components"]["stt"]["status"], "error");
        assert_eq!(json["components"]["stt"]["message"], "Binary exists: false");
        assert_eq!(json["components"]["llm"]["status"], "ok");
        assert_eq!(json["components"]["tts"]["status"], "ok");
    }

    #[tokio::test]
    async fn completed_request_returns_wav_with_process_info() {
        let res = app()
            .oneshot(multipart_request("/voice-chat", "audio", "question.wav", &wav_bytes()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "audio/wav");
        assert!(res.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("response.wav"));

        let info: serde_json::Value =
            serde_json::from_str(res.headers()[PROCESS_INFO_HEADER].to_str().unwrap()).unwrap();
        assert_eq!(info["status"], "completed");
        assert_eq!(info["stages"].as_array().unwrap().len(), 3);
        assert_eq!(info["transcript"], "Apa ibukota Prancis?");
        assert_eq!(info["response"], "Ibukota Prancis adalah Paris.");

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..4], b"RIFF");
    }

    #[tokio::test]
    async fn aborted_request_is_bad_gateway_json() {
        let res = app_with(Arc::new(RejectingStt), 1024 * 1024)
            .oneshot(multipart_request("/voice-chat", "audio", "question.wav", &wav_bytes()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(res).await;
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["stages"].as_array().unwrap().len(), 1);
        assert_eq!(json["aborted"]["failed_stage"], "STT");
        assert_eq!(json["aborted"]["error"]["kind"], "EngineRejected");
    }

    #[tokio::test]
    async fn json_endpoint_returns_metrics() {
        let res = app()
            .oneshot(multipart_request("/api/v1/voice-chat", "audio", "clip.ogg", b"OggS fake"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = json_body(res).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["output_audio"]["encoding"], "wav");
        assert!(json["total_duration_ms"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let res = app()
            .oneshot(multipart_request("/voice-chat", "audio", "notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = json_body(res).await;
        assert!(json["detail"].as_str().unwrap().contains(".wav, .mp3, .ogg, .m4a"));
    }

    #[tokio::test]
    async fn missing_and_empty_uploads_are_rejected() {
        let res = app()
            .oneshot(multipart_request("/voice-chat", "file", "question.wav", &wav_bytes()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app()
            .oneshot(multipart_request("/voice-chat", "audio", "question.wav", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_refused() {
        let res = app_with(Arc::new(PlaceholderStt::new()), 256)
            .oneshot(multipart_request("/voice-chat", "audio", "question.wav", &vec![0u8; 4096]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn ascii_json_escapes_non_ascii() {
        let escaped = ascii_json(r#"{"response":"café 😀"}"#);
        assert!(escaped.is_ascii());
        assert_eq!(escaped, r#"{"response":"caf\u00e9 \ud83d\ude00"}"#);
        let back: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(back["response"], "café 😀");
    }

    #[test]
    fn ascii_json_escapes_delete() {
        let escaped = ascii_json("{\"response\":\"Paris\u{7f}.\"}");
        assert_eq!(escaped, r#"{"response":"Paris\u007f."}"#);
        assert!(HeaderValue::from_str(&escaped).is_ok());
    }

    #[tokio::test]
    async fn completed_request_survives_delete_in_response() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(PlaceholderStt::with_response("Apa ibukota Prancis?")),
            Arc::new(PlaceholderLlm::with_response("Paris\u{7f}.")),
            Arc::new(PlaceholderTts),
            StageTimeouts::default(),
        );
        let res = router(AppState::new(orchestrator), 1024 * 1024)
            .oneshot(multipart_request("/voice-chat", "audio", "question.wav", &wav_bytes()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let info: serde_json::Value =
            serde_json::from_str(res.headers()[PROCESS_INFO_HEADER].to_str().unwrap()).unwrap();
        assert_eq!(info["status"], "completed");
        assert_eq!(info["response"], "Paris\u{7f}.");
    }
}
