use crate::echo::EchoGuard;
use crate::session::AvatarSession;
use std::sync::{Arc, Mutex, PoisonError};

/// Final dispatch point for everything the orchestrator says. Every
/// response refreshes the echo guard before it reaches the session.
#[derive(Clone)]
pub struct ResponseSpeaker {
    session: Arc<dyn AvatarSession>,
    guard: Arc<Mutex<EchoGuard>>,
}

impl ResponseSpeaker {
    pub fn new(session: Arc<dyn AvatarSession>) -> Self {
        Self {
            session,
            guard: Arc::new(Mutex::new(EchoGuard::default())),
        }
    }

    /// Snapshot of the current guard, for echo checks.
    pub fn echo_guard(&self) -> EchoGuard {
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, text: &str) {
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(text);
    }

    /// Speaks final text verbatim through the session's repeat channel.
    pub async fn speak(&self, text: &str) {
        self.remember(text);
        tracing::info!("Avatar says: \"{}\"", text);
        if let Err(e) = self.session.repeat(text).await {
            tracing::error!("Failed to dispatch spoken response: {:?}", e);
        }
    }

    /// Plays synthesized audio for `text`.
    pub async fn speak_audio(&self, text: &str, audio: Vec<u8>) {
        self.remember(text);
        tracing::info!("Avatar says ({} audio bytes): \"{}\"", audio.len(), text);
        if let Err(e) = self.session.repeat_audio(audio).await {
            tracing::error!("Failed to dispatch audio response: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::FakeSession;

    #[tokio::test]
    async fn speak_records_guard_then_repeats() {
        let session = FakeSession::new();
        let speaker = ResponseSpeaker::new(session.clone());

        speaker.speak("I can see a small green cactus on a windowsill.").await;

        assert_eq!(
            session.spoken(),
            vec!["I can see a small green cactus on a windowsill.".to_string()]
        );
        assert_eq!(
            speaker.echo_guard().last_response_prefix(),
            "I can see a small green cactus on a windowsill."
        );
    }

    #[tokio::test]
    async fn speak_audio_records_guard() {
        let session = FakeSession::new();
        let speaker = ResponseSpeaker::new(session.clone());

        speaker.speak_audio("hello there", vec![1, 2, 3]).await;

        assert_eq!(*session.audio.lock().unwrap(), vec![vec![1, 2, 3]]);
        assert_eq!(speaker.echo_guard().last_response_prefix(), "hello there");
    }
}
