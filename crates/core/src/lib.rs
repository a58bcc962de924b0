pub mod analyzer;
pub mod api_types;
pub mod backend;
pub mod capture;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod echo;
pub mod frame;
pub mod intent;
pub mod lifecycle;
pub mod session;
pub mod speaker;

pub use analyzer::VisionAnalyzer;
pub use capture::{CameraDevice, CaptureError, CaptureSource, StaticImage};
pub use config::OrchestratorConfig;
pub use coordinator::{AnalysisRequestCoordinator, Outcome, Trigger};
pub use lifecycle::SessionLifecycleManager;
pub use session::{AvatarSession, EventEmitter, SessionEvent, SessionEventKind, SessionState};
pub use speaker::ResponseSpeaker;
