use crate::error::ApiError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

/// Output format requested from the speech provider.
pub const SPEECH_OUTPUT_FORMAT: &str = "pcm_24000";
const SPEECH_MODEL: &str = "eleven_turbo_v2_5";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

/// Builds an OpenAI-compatible chat body with a system and a user message.
pub fn chat_body(model: &str, system_prompt: &str, message: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": message }
        ]
    })
}

/// Builds a vision body: one user message holding the prompt followed by
/// every image as a data URL.
pub fn vision_body(
    model: &str,
    prompt: &str,
    image_urls: impl IntoIterator<Item = String>,
    max_tokens: u32,
) -> Value {
    let mut content = vec![json!({ "type": "text", "text": prompt })];
    content.extend(
        image_urls
            .into_iter()
            .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
    );
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": max_tokens
    })
}

/// HTTP client for the chat-completions and speech providers.
#[derive(Clone, Default)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `body` to `{base_url}/chat/completions` and returns the first
    /// choice's text.
    pub async fn chat_completion(
        &self,
        base_url: &str,
        api_key: &SecretString,
        body: &Value,
    ) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .bearer_auth(api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let resp = check_status(resp).await?;

        let resp = resp
            .json::<LlmResponse>()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ApiError::Internal("No response from LLM".to_string()))
    }

    /// Synthesizes `text` and returns the raw PCM bytes.
    pub async fn text_to_speech(
        &self,
        base_url: &str,
        api_key: &SecretString,
        voice_id: &str,
        text: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let resp = self
            .client
            .post(format!(
                "{}/text-to-speech/{}",
                base_url.trim_end_matches('/'),
                voice_id
            ))
            .query(&[("output_format", SPEECH_OUTPUT_FORMAT)])
            .header("xi-api-key", api_key.expose_secret())
            .json(&json!({ "text": text, "model_id": SPEECH_MODEL }))
            .send()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let resp = check_status(resp).await?;

        let audio = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let details = resp.text().await.unwrap_or_default();
    tracing::error!("Upstream API error ({}): {}", status, details);
    Err(ApiError::Upstream {
        status,
        message: "Upstream request failed".to_string(),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_body_puts_prompt_before_images() {
        let body = vision_body(
            "grok-2-vision-1212",
            "Describe this",
            ["data:image/jpeg;base64,AAAA".to_string(), "data:image/jpeg;base64,BBBB".to_string()],
            1500,
        );

        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["text"], "Describe this");
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,BBBB");
        assert_eq!(body["max_tokens"], 1500);
    }

    #[test]
    fn chat_body_has_system_then_user() {
        let body = chat_body("grok-2", "Be cheerful.", "hi");
        assert_eq!(body["model"], "grok-2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
