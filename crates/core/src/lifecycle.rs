use crate::capture::{CameraDevice, CaptureSource, StaticImage};
use crate::config::OrchestratorConfig;
use crate::coordinator::{AnalysisRequestCoordinator, Trigger};
use crate::session::{AvatarSession, SessionEvent, SessionEventKind, SessionState, Subscription};
use crate::speaker::ResponseSpeaker;
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    Pending,
    Sent,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    greeting: Greeting,
    /// Held only while camera mode is on.
    transcription: Option<Subscription>,
    session_subs: Vec<Subscription>,
}

/// Drives connect/greet/disconnect and wires transcriptions into the
/// coordinator for the duration of camera mode.
pub struct SessionLifecycleManager {
    session: Arc<dyn AvatarSession>,
    coordinator: Arc<AnalysisRequestCoordinator>,
    speaker: ResponseSpeaker,
    camera: Arc<dyn CameraDevice>,
    fallback: Option<StaticImage>,
    config: OrchestratorConfig,
    inner: Mutex<Inner>,
}

impl SessionLifecycleManager {
    pub fn new(
        session: Arc<dyn AvatarSession>,
        coordinator: Arc<AnalysisRequestCoordinator>,
        speaker: ResponseSpeaker,
        camera: Arc<dyn CameraDevice>,
        fallback: Option<StaticImage>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            session,
            coordinator,
            speaker,
            camera,
            fallback,
            config,
            inner: Mutex::new(Inner {
                state: SessionState::Inactive,
                greeting: Greeting::Pending,
                transcription: None,
                session_subs: Vec::new(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.inner().state
    }

    pub fn greeting(&self) -> Greeting {
        self.inner().greeting
    }

    pub fn is_camera_mode(&self) -> bool {
        self.inner().transcription.is_some()
    }

    /// Starts following the session's lifecycle events and connects it if
    /// nobody has yet.
    pub async fn attach(self: &Arc<Self>) -> Result<()> {
        let subs: Vec<Subscription> = [SessionEventKind::StateChanged, SessionEventKind::StreamReady]
            .into_iter()
            .map(|kind| {
                let weak = Arc::downgrade(self);
                self.session.subscribe(
                    kind,
                    Arc::new(move |event: &SessionEvent| {
                        if let Some(this) = weak.upgrade() {
                            this.on_session_event(event);
                        }
                    }),
                )
            })
            .collect();

        let state = self.session.state();
        {
            let mut inner = self.inner();
            inner.session_subs.extend(subs);
            inner.state = state;
        }

        if state == SessionState::Inactive {
            tracing::info!("Session inactive, connecting...");
            self.session.start().await?;
        }
        Ok(())
    }

    fn on_session_event(self: &Arc<Self>, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => self.on_state_changed(*state),
            SessionEvent::StreamReady => {
                tracing::info!("Avatar stream ready.");
                self.maybe_greet();
            }
            SessionEvent::UserTranscription { .. } => {}
        }
    }

    fn on_state_changed(self: &Arc<Self>, state: SessionState) {
        let previous = std::mem::replace(&mut self.inner().state, state);
        if previous == state {
            return;
        }
        tracing::info!("Session state: {:?} -> {:?}", previous, state);
        match state {
            SessionState::Connected => self.maybe_greet(),
            SessionState::Disconnected => self.on_disconnected(),
            SessionState::Inactive | SessionState::Connecting => {}
        }
    }

    fn maybe_greet(self: &Arc<Self>) {
        let stream_ready = self.session.is_stream_ready();
        {
            let mut inner = self.inner();
            if inner.state != SessionState::Connected
                || !stream_ready
                || inner.greeting == Greeting::Sent
            {
                return;
            }
            inner.greeting = Greeting::Sent;
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.greeting_delay).await;
            let connected = this.state() == SessionState::Connected;
            if !connected {
                tracing::debug!("Session went away before the greeting.");
                return;
            }
            this.speaker.speak(&this.config.greeting).await;
        });
    }

    fn on_disconnected(&self) {
        let transcription = {
            let mut inner = self.inner();
            inner.greeting = Greeting::Pending;
            inner.transcription.take()
        };
        drop(transcription);
        self.coordinator.deactivate_camera();
    }

    /// Turns camera mode on or off. While on, exactly one transcription
    /// listener feeds the coordinator.
    pub async fn set_camera_mode(&self, enabled: bool) {
        if !enabled {
            let transcription = self.inner().transcription.take();
            drop(transcription);
            self.coordinator.deactivate_camera();
            return;
        }
        if self.coordinator.camera_mode().is_active() {
            tracing::debug!("Camera mode already on.");
            return;
        }

        let capture =
            match CaptureSource::activate(self.camera.as_ref(), self.fallback.clone()).await {
                Ok(capture) => Some(capture),
                Err(e) => {
                    tracing::warn!("Entering camera mode without a frame source: {}", e);
                    None
                }
            };

        let coordinator = Arc::downgrade(&self.coordinator);
        let subscription = self.session.subscribe(
            SessionEventKind::UserTranscription,
            Arc::new(move |event: &SessionEvent| {
                if let (SessionEvent::UserTranscription { text }, Some(coordinator)) =
                    (event, coordinator.upgrade())
                {
                    let _ = coordinator.handle_utterance(text, Trigger::Spoken);
                }
            }),
        );

        if self.coordinator.activate_camera(capture).is_some() {
            self.inner().transcription = Some(subscription);
        }
    }

    /// Disposes every listener, leaves camera mode and stops the session.
    pub async fn shutdown(&self) -> Result<()> {
        let subs = {
            let mut inner = self.inner();
            let mut subs = std::mem::take(&mut inner.session_subs);
            subs.extend(inner.transcription.take());
            subs
        };
        drop(subs);
        self.coordinator.deactivate_camera();
        tracing::info!("Stopping avatar session.");
        self.session.stop().await
    }
}
