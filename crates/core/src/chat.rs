//! Non-visual conversation path: chat completion, speech synthesis, and
//! playback through the avatar.

use crate::api_types::ChatRequest;
use crate::speaker::ResponseSpeaker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait ChatApi: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechApi: Send + Sync {
    /// Returns base64-encoded PCM for `text`.
    async fn synthesize(&self, text: String) -> Result<String>;
}

pub struct TextChat {
    chat: Arc<dyn ChatApi>,
    speech: Arc<dyn SpeechApi>,
    speaker: ResponseSpeaker,
}

impl TextChat {
    pub fn new(chat: Arc<dyn ChatApi>, speech: Arc<dyn SpeechApi>, speaker: ResponseSpeaker) -> Self {
        Self {
            chat,
            speech,
            speaker,
        }
    }

    /// Sends `message` to the chat model and has the avatar speak the reply.
    pub async fn send_message(&self, message: &str) -> Result<String> {
        let reply = self
            .chat
            .complete(ChatRequest::new(message))
            .await
            .context("Chat completion failed")?;
        if reply.trim().is_empty() {
            anyhow::bail!("No response text received from chat completion");
        }

        let audio_base64 = self
            .speech
            .synthesize(reply.clone())
            .await
            .context("Speech synthesis failed")?;
        if audio_base64.is_empty() {
            anyhow::bail!("No audio data received from speech synthesis");
        }
        let audio = base64::engine::general_purpose::STANDARD
            .decode(audio_base64.as_bytes())
            .context("Speech audio is not valid base64")?;

        tracing::debug!(
            "Audio received, base64 length: {}, decoded length: {}",
            audio_base64.len(),
            audio.len()
        );
        self.speaker.speak_audio(&reply, audio).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::FakeSession;

    fn text_chat(
        chat: MockChatApi,
        speech: MockSpeechApi,
    ) -> (TextChat, Arc<FakeSession>, ResponseSpeaker) {
        let session = FakeSession::new();
        let speaker = ResponseSpeaker::new(session.clone());
        (
            TextChat::new(Arc::new(chat), Arc::new(speech), speaker.clone()),
            session,
            speaker,
        )
    }

    #[tokio::test]
    async fn reply_is_synthesized_and_played() {
        let mut chat = MockChatApi::new();
        chat.expect_complete()
            .withf(|req| req.message == "tell me a joke" && req.model.is_none())
            .times(1)
            .returning(|_| Box::pin(async { Ok("Why did the camera blush?".to_string()) }));
        let mut speech = MockSpeechApi::new();
        speech
            .expect_synthesize()
            .withf(|text| text == "Why did the camera blush?")
            .times(1)
            .returning(|_| Box::pin(async { Ok("AAECAw==".to_string()) }));

        let (text_chat, session, speaker) = text_chat(chat, speech);
        let reply = text_chat.send_message("tell me a joke").await.unwrap();

        assert_eq!(reply, "Why did the camera blush?");
        assert_eq!(*session.audio.lock().unwrap(), vec![vec![0, 1, 2, 3]]);
        assert_eq!(
            speaker.echo_guard().last_response_prefix(),
            "Why did the camera blush?"
        );
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let mut chat = MockChatApi::new();
        chat.expect_complete()
            .returning(|_| Box::pin(async { Ok("   ".to_string()) }));
        let mut speech = MockSpeechApi::new();
        speech.expect_synthesize().never();

        let (text_chat, session, _) = text_chat(chat, speech);

        assert!(text_chat.send_message("hi").await.is_err());
        assert!(session.audio.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_audio_is_an_error() {
        let mut chat = MockChatApi::new();
        chat.expect_complete()
            .returning(|_| Box::pin(async { Ok("hello".to_string()) }));
        let mut speech = MockSpeechApi::new();
        speech
            .expect_synthesize()
            .returning(|_| Box::pin(async { Ok("not base64!!".to_string()) }));

        let (text_chat, session, _) = text_chat(chat, speech);

        assert!(text_chat.send_message("hi").await.is_err());
        assert!(session.audio.lock().unwrap().is_empty());
    }
}
