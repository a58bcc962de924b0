use std::time::Duration;

pub const DEFAULT_GREETING: &str = "Hello I am 6, your personal assistant, how can I help you today";

/// Timings and texts the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long an accepted question suppresses an identical one.
    pub dedup_window: Duration,
    /// Dedup window after a failed attempt, so the user can simply ask again.
    pub retry_window: Duration,
    /// Upper bound on waiting for a live stream to become capturable.
    pub capture_timeout: Duration,
    /// Delay between entering camera mode and the automatic description.
    pub auto_settle: Duration,
    /// Delay between the session connecting and the greeting.
    pub greeting_delay: Duration,
    pub greeting: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5),
            retry_window: Duration::from_secs(2),
            capture_timeout: Duration::from_secs(3),
            auto_settle: Duration::from_millis(500),
            greeting_delay: Duration::from_secs(1),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}
