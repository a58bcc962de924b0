use crate::analyzer::VisionAnalyzer;
use crate::api_types::{
    AnalysisResponse, ChatRequest, ChatResponse, ErrorBody, SpeechRequest, SpeechResponse,
};
use crate::chat::{ChatApi, SpeechApi};
use crate::frame::Image;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

pub const ANALYZE_IMAGE_PATH: &str = "/api/analyze-image";
pub const TEXT_TO_SPEECH_PATH: &str = "/api/elevenlabs-text-to-speech";

/// Which chat route the text path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarMode {
    /// Always the xAI chat route.
    Full,
    /// The provider-switched route.
    Custom,
}

impl AvatarMode {
    pub fn chat_path(&self) -> &'static str {
        match self {
            Self::Full => "/api/grokai-chat-complete",
            Self::Custom => "/api/openai-chat-complete",
        }
    }
}

/// HTTP client for the sightline API service.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    mode: AvatarMode,
}

impl BackendClient {
    pub fn new(base_url: &str, mode: AvatarMode) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turns a response into `T`, or into an error carrying the service's
/// `{error, details}` payload.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => match err.details {
                Some(details) => format!("{}: {}", err.error, details),
                None => err.error,
            },
            Err(_) => body,
        };
        anyhow::bail!("{what} failed ({status}): {message}");
    }
    resp.json::<T>()
        .await
        .with_context(|| format!("Unexpected {what} response body"))
}

#[async_trait]
impl VisionAnalyzer for BackendClient {
    async fn analyze(&self, image: Image, question: String) -> Result<String> {
        let extension = match image.content_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        };
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(format!("frame.{extension}"))
            .mime_str(&image.content_type)?;
        let form = Form::new().part("image", part).text("question", question);

        let resp = self
            .client
            .post(self.url(ANALYZE_IMAGE_PATH))
            .multipart(form)
            .send()
            .await
            .context("Image analysis request failed")?;
        let body: AnalysisResponse = read_json(resp, "Image analysis").await?;
        Ok(body.analysis)
    }
}

#[async_trait]
impl ChatApi for BackendClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let resp = self
            .client
            .post(self.url(self.mode.chat_path()))
            .json(&request)
            .send()
            .await
            .context("Chat request failed")?;
        let body: ChatResponse = read_json(resp, "Chat completion").await?;
        Ok(body.response)
    }
}

#[async_trait]
impl SpeechApi for BackendClient {
    async fn synthesize(&self, text: String) -> Result<String> {
        let resp = self
            .client
            .post(self.url(TEXT_TO_SPEECH_PATH))
            .json(&SpeechRequest { text })
            .send()
            .await
            .context("Speech request failed")?;
        let body: SpeechResponse = read_json(resp, "Speech synthesis").await?;
        Ok(body.audio)
    }
}
