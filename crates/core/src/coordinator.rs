use crate::analyzer::VisionAnalyzer;
use crate::capture::{CaptureError, CaptureSource, FrameSource};
use crate::config::OrchestratorConfig;
use crate::echo::EchoFilter;
use crate::frame::FrameCapture;
use crate::intent::IntentClassifier;
use crate::speaker::ResponseSpeaker;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const NO_DEVICE_APOLOGY: &str = "I'm sorry, I can't find a camera to look through right now. \
    Please check that one is connected and try again.";
const CAPTURE_APOLOGY: &str =
    "Oops, I couldn't get a clear look just now. Could you ask me again in a moment?";
const ANALYSIS_APOLOGY: &str =
    "Sorry, I had trouble analyzing what I'm seeing. Please try asking again.";

/// Who asked for an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A transcribed user utterance.
    Spoken,
    /// The one-shot description fired when camera mode is entered.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Inactive,
    /// Entered camera mode; the automatic description has not fired yet.
    ActivatingAuto { generation: u64 },
    Active,
}

impl CameraMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub question: String,
    pub started_at: Instant,
    pub state: AnalysisState,
}

#[derive(Debug, Clone)]
pub struct DedupWindow {
    pub last_question: String,
    pub expires_at: Instant,
}

impl DedupWindow {
    fn blocks(&self, question: &str, now: Instant) -> bool {
        now < self.expires_at && self.last_question == question
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    CameraInactive,
    /// Another analysis is in flight.
    Busy,
    Empty,
    Echo,
    Duplicate,
    NotVisual,
    /// An auto-trigger from an earlier camera-mode activation.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    NoDevice,
    Capture(CaptureError),
    Collaborator,
}

impl FailureCause {
    fn apology(&self) -> &'static str {
        match self {
            Self::NoDevice => NO_DEVICE_APOLOGY,
            Self::Capture(_) => CAPTURE_APOLOGY,
            Self::Collaborator => ANALYSIS_APOLOGY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rejected(Rejection),
    Answered,
    Apologized(FailureCause),
}

#[derive(Debug)]
struct State {
    camera: CameraMode,
    generation: u64,
    capture: Option<CaptureSource>,
    pending: Option<PendingAnalysis>,
    dedup: Option<DedupWindow>,
}

/// An admitted request: single-flight state is already recorded.
struct Admitted {
    question: String,
    source: Option<FrameSource>,
}

/// Single-flight controller between transcriptions and frame analysis.
pub struct AnalysisRequestCoordinator {
    analyzer: Arc<dyn VisionAnalyzer>,
    classifier: Arc<dyn IntentClassifier>,
    echo: EchoFilter,
    frames: FrameCapture,
    speaker: ResponseSpeaker,
    config: OrchestratorConfig,
    state: Mutex<State>,
}

impl AnalysisRequestCoordinator {
    pub fn new(
        analyzer: Arc<dyn VisionAnalyzer>,
        classifier: Arc<dyn IntentClassifier>,
        speaker: ResponseSpeaker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            analyzer,
            classifier,
            echo: EchoFilter,
            frames: FrameCapture::new(config.capture_timeout),
            speaker,
            config,
            state: Mutex::new(State {
                camera: CameraMode::Inactive,
                generation: 0,
                capture: None,
                pending: None,
                dedup: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.state().camera
    }

    pub fn pending(&self) -> Option<PendingAnalysis> {
        self.state().pending.clone()
    }

    pub fn dedup_window(&self) -> Option<DedupWindow> {
        self.state().dedup.clone()
    }

    /// Enters camera mode with `capture` as the frame source (`None` when no
    /// device and no fallback exist) and schedules the one automatic
    /// description for this activation. Returns `None` when camera mode was
    /// already active; the extra source is released.
    pub fn activate_camera(
        self: &Arc<Self>,
        capture: Option<CaptureSource>,
    ) -> Option<JoinHandle<Outcome>> {
        let generation = {
            let mut state = self.state();
            if state.camera.is_active() {
                tracing::debug!("Camera mode already active.");
                return None;
            }
            state.generation += 1;
            state.camera = CameraMode::ActivatingAuto {
                generation: state.generation,
            };
            state.capture = capture;
            state.generation
        };
        tracing::info!("Camera mode on (activation {}).", generation);

        let this = self.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(this.config.auto_settle).await;
            this.fire_auto(generation).await
        }))
    }

    async fn fire_auto(&self, generation: u64) -> Outcome {
        {
            let mut state = self.state();
            match state.camera {
                CameraMode::ActivatingAuto { generation: current } if current == generation => {
                    state.camera = CameraMode::Active;
                }
                CameraMode::Inactive => return Outcome::Rejected(Rejection::CameraInactive),
                _ => return Outcome::Rejected(Rejection::Stale),
            }
        }
        tracing::info!("Running automatic description for activation {}.", generation);
        self.process("", Trigger::Auto).await
    }

    /// Leaves camera mode and releases the capture source. An analysis
    /// already in flight is left to settle on its own.
    pub fn deactivate_camera(&self) {
        let capture = {
            let mut state = self.state();
            if !state.camera.is_active() {
                return;
            }
            state.camera = CameraMode::Inactive;
            state.capture.take()
        };
        if let Some(mut capture) = capture {
            capture.deactivate();
        }
        tracing::info!("Camera mode off.");
    }

    /// Fire-and-forget entry point for transcription listeners. Admission
    /// happens before this returns; the capture and analysis run on a
    /// spawned task.
    pub fn handle_utterance(
        self: &Arc<Self>,
        text: &str,
        trigger: Trigger,
    ) -> Option<JoinHandle<Outcome>> {
        match self.admit(text, trigger) {
            Ok(admitted) => {
                let this = self.clone();
                Some(tokio::spawn(async move { this.run(admitted).await }))
            }
            Err(rejection) => {
                tracing::debug!("Ignoring utterance \"{}\": {:?}", text, rejection);
                None
            }
        }
    }

    /// Admits and runs one request to completion.
    pub async fn process(&self, text: &str, trigger: Trigger) -> Outcome {
        match self.admit(text, trigger) {
            Ok(admitted) => self.run(admitted).await,
            Err(rejection) => {
                tracing::debug!("Ignoring utterance \"{}\": {:?}", text, rejection);
                Outcome::Rejected(rejection)
            }
        }
    }

    fn admit(&self, text: &str, trigger: Trigger) -> Result<Admitted, Rejection> {
        let question = match trigger {
            Trigger::Spoken => text.trim(),
            Trigger::Auto => "",
        };
        let guard = self.speaker.echo_guard();
        let now = Instant::now();

        let mut state = self.state();
        if !state.camera.is_active() {
            return Err(Rejection::CameraInactive);
        }
        if state.pending.is_some() {
            return Err(Rejection::Busy);
        }
        if trigger == Trigger::Spoken {
            if self.echo.is_echo(question, &guard) {
                return Err(Rejection::Echo);
            }
            if question.is_empty() {
                return Err(Rejection::Empty);
            }
            if state
                .dedup
                .as_ref()
                .is_some_and(|d| d.blocks(question, now))
            {
                return Err(Rejection::Duplicate);
            }
            if !self.classifier.is_visual_query(question) {
                return Err(Rejection::NotVisual);
            }
        }

        state.pending = Some(PendingAnalysis {
            question: question.to_string(),
            started_at: now,
            state: AnalysisState::Running,
        });
        state.dedup = Some(DedupWindow {
            last_question: question.to_string(),
            expires_at: now + self.config.dedup_window,
        });
        let source = state
            .capture
            .as_ref()
            .and_then(CaptureSource::current_frame_source);

        tracing::info!("Analyzing (trigger: {:?}): \"{}\"", trigger, question);
        Ok(Admitted {
            question: question.to_string(),
            source,
        })
    }

    async fn run(&self, admitted: Admitted) -> Outcome {
        let mut pending = PendingGuard {
            coordinator: self,
            outcome: AnalysisState::Failed,
        };
        let outcome = self.capture_and_analyze(admitted).await;
        if outcome == Outcome::Answered {
            pending.outcome = AnalysisState::Done;
        }
        outcome
    }

    async fn capture_and_analyze(&self, admitted: Admitted) -> Outcome {
        let image = match &admitted.source {
            None => Err(FailureCause::NoDevice),
            Some(source) => self.frames.capture(source).await.map_err(|e| match e {
                CaptureError::NoDevice => FailureCause::NoDevice,
                other => FailureCause::Capture(other),
            }),
        };
        let image = match image {
            Ok(image) => image,
            Err(cause) => return self.fail(cause).await,
        };

        match self.analyzer.analyze(image, admitted.question).await {
            Ok(answer) if !answer.trim().is_empty() => {
                self.speaker.speak(answer.trim()).await;
                Outcome::Answered
            }
            Ok(_) => {
                tracing::warn!("Analysis returned an empty answer.");
                self.fail(FailureCause::Collaborator).await
            }
            Err(e) => {
                tracing::warn!("Analysis failed: {:?}", e);
                self.fail(FailureCause::Collaborator).await
            }
        }
    }

    async fn fail(&self, cause: FailureCause) -> Outcome {
        tracing::warn!("Apologizing for failed analysis: {:?}", cause);
        self.speaker.speak(cause.apology()).await;
        Outcome::Apologized(cause)
    }

    /// Clears the pending analysis. Failures also pull the dedup window in
    /// so a retry is not blocked for long.
    fn finish(&self, outcome: AnalysisState) {
        let now = Instant::now();
        let mut state = self.state();
        if let Some(mut pending) = state.pending.take() {
            pending.state = outcome;
            tracing::debug!(
                "Analysis of \"{}\" finished as {:?} after {:?}.",
                pending.question,
                pending.state,
                now - pending.started_at
            );
        }
        if outcome == AnalysisState::Failed {
            let retry_at = now + self.config.retry_window;
            if let Some(dedup) = state.dedup.as_mut() {
                dedup.expires_at = dedup.expires_at.min(retry_at);
            }
        }
    }
}

/// Clears the pending analysis when dropped, so a task that unwinds or is
/// aborted mid-flight still frees the coordinator.
struct PendingGuard<'a> {
    coordinator: &'a AnalysisRequestCoordinator,
    outcome: AnalysisState,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.finish(self.outcome);
    }
}
