use crate::config::{Config, LlmProvider};
use crate::error::ApiError;
use crate::upstream::{UpstreamClient, chat_body, vision_body};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use sightline_core::api_types::{
    AnalysisResponse, ChatRequest, ChatResponse, SpeechRequest, SpeechResponse,
    VideoAnalysisRequest,
};
use std::sync::Arc;

const VISION_MODEL: &str = "grok-2-vision-1212";
const IMAGE_MAX_TOKENS: u32 = 1000;
const VIDEO_MAX_TOKENS: u32 = 1500;
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const IMAGE_PROMPT: &str = "Please analyze this image in detail with a funny, gregarious, and happy \
personality! Describe what you see, including objects, people, text, colors, layout, context, and \
any other relevant details. Be thorough and specific, but make your analysis entertaining, \
enthusiastic, and full of personality. Use humor, be conversational, and inject some cheerfulness \
into your observations. Think of yourself as a friendly, outgoing friend who's excited to tell \
someone about what they're seeing!";

const VIDEO_PROMPT: &str = "Please analyze this video by examining the key frames I've extracted. \
Describe what you see across these frames, including objects, people, text, colors, actions, \
movement, context, and any other relevant details. Be thorough and specific, but make your \
analysis entertaining, enthusiastic, and full of personality. Use humor, be conversational, and \
inject some cheerfulness into your observations. Think of yourself as a friendly, outgoing friend \
who's excited to tell someone about what they're seeing in this video!";

const ASSISTANT_PROMPT: &str =
    "You are a helpful assistant. You are being used in a demo. Please act courteously and helpfully.";

const GROK_PROMPT: &str = "You are a funny, gregarious, and happy assistant. You are being used in \
a demo. Always respond with enthusiasm, humor, and a positive attitude. Be friendly, engaging, and \
make people smile with your responses. Use jokes, emojis when appropriate, and maintain a cheerful, \
outgoing personality.";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: UpstreamClient,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze-image", post(analyze_image))
        .route("/api/analyze-video", post(analyze_video))
        .route("/api/openai-chat-complete", post(openai_chat_complete))
        .route("/api/grokai-chat-complete", post(grokai_chat_complete))
        .route("/api/elevenlabs-text-to-speech", post(text_to_speech))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// The vision prompt, narrowed to the user's question when one was asked.
fn image_prompt(question: &str) -> String {
    let question = question.trim();
    if question.is_empty() {
        IMAGE_PROMPT.to_string()
    } else {
        format!("{IMAGE_PROMPT}\n\nThe person looking at this asked: \"{question}\". Answer that first.")
    }
}

async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut image: Option<(Bytes, String)> = None;
    let mut question = String::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field
                    .content_type()
                    .filter(|ct| ct.starts_with("image/"))
                    .unwrap_or("image/jpeg")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                image = Some((data, content_type));
            }
            "question" => {
                question = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            }
            _ => {}
        }
    }

    let (data, content_type) = image
        .filter(|(data, _)| !data.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Image file is required".to_string()))?;
    let key = state
        .config
        .grokai_api_key
        .as_ref()
        .ok_or_else(|| ApiError::missing_key("GrokAI", "GROKAI_API_KEY"))?;

    tracing::info!(
        "Analyzing {} byte {} image (question: {:?})",
        data.len(),
        content_type,
        question
    );
    let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(&data));
    let body = vision_body(VISION_MODEL, &image_prompt(&question), [data_url], IMAGE_MAX_TOKENS);
    let analysis = state
        .upstream
        .chat_completion(&state.config.xai_base_url, key, &body)
        .await
        .map_err(|e| e.context("Failed to analyze image"))?;
    Ok(Json(AnalysisResponse { analysis }))
}

async fn analyze_video(
    State(state): State<AppState>,
    request: Result<Json<VideoAnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = request?;
    if request.frames.is_empty() {
        return Err(ApiError::BadRequest("Video frames are required".to_string()));
    }
    let key = state
        .config
        .grokai_api_key
        .as_ref()
        .ok_or_else(|| ApiError::missing_key("GrokAI", "GROKAI_API_KEY"))?;

    tracing::info!("Analyzing video from {} frames", request.frames.len());
    let frames = request
        .frames
        .into_iter()
        .map(|frame| format!("data:image/jpeg;base64,{frame}"));
    let body = vision_body(VISION_MODEL, VIDEO_PROMPT, frames, VIDEO_MAX_TOKENS);
    let analysis = state
        .upstream
        .chat_completion(&state.config.xai_base_url, key, &body)
        .await
        .map_err(|e| e.context("Failed to analyze video"))?;
    Ok(Json(AnalysisResponse { analysis }))
}

async fn openai_chat_complete(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request?;
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }
    let config = &state.config;
    let (provider, key, var, base_url, default_model) = match config.llm_provider {
        LlmProvider::Xai => (
            "xAI",
            config.xai_api_key.as_ref(),
            "XAI_API_KEY",
            &config.xai_base_url,
            "grok-2-latest",
        ),
        LlmProvider::OpenAi => (
            "OpenAI",
            config.openai_api_key.as_ref(),
            "OPENAI_API_KEY",
            &config.openai_base_url,
            "gpt-4o-mini",
        ),
    };
    let key = key.ok_or_else(|| ApiError::missing_key(provider, var))?;

    let model = request.model.as_deref().unwrap_or(default_model);
    let system_prompt = request.system_prompt.as_deref().unwrap_or(ASSISTANT_PROMPT);
    tracing::info!("Chat completion via {} ({})", provider, model);
    let response = state
        .upstream
        .chat_completion(base_url, key, &chat_body(model, system_prompt, &request.message))
        .await
        .map_err(|e| e.context(&format!("Failed to generate response from {provider}")))?;
    Ok(Json(ChatResponse { response }))
}

async fn grokai_chat_complete(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request?;
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }
    let key = state
        .config
        .grokai_api_key
        .as_ref()
        .ok_or_else(|| ApiError::missing_key("GrokAI", "GROKAI_API_KEY"))?;

    let model = request.model.as_deref().unwrap_or("grok-2");
    let system_prompt = request.system_prompt.as_deref().unwrap_or(GROK_PROMPT);
    let response = state
        .upstream
        .chat_completion(
            &state.config.xai_base_url,
            key,
            &chat_body(model, system_prompt, &request.message),
        )
        .await
        .map_err(|e| e.context("Failed to generate response"))?;
    Ok(Json(ChatResponse { response }))
}

async fn text_to_speech(
    State(state): State<AppState>,
    request: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let Json(request) = request?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    let config = &state.config;
    let key = config
        .elevenlabs_api_key
        .as_ref()
        .ok_or_else(|| ApiError::missing_key("ElevenLabs", "ELEVENLABS_API_KEY"))?;

    let audio = state
        .upstream
        .text_to_speech(
            &config.elevenlabs_base_url,
            key,
            &config.elevenlabs_voice_id,
            &request.text,
        )
        .await
        .map_err(|e| e.context("Failed to synthesize speech"))?;
    tracing::debug!("Synthesized {} bytes of audio", audio.len());
    Ok(Json(SpeechResponse {
        audio: STANDARD.encode(audio),
    }))
}
