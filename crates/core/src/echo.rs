//! Self-echo suppression.
//!
//! The avatar's synthesized speech is picked up by the same transcription
//! pipeline as the user's voice, so a spoken answer can come back as a
//! "user utterance". Feeding it into analysis again would loop forever.

use tokio::time::Instant;

/// Utterances longer than this are treated as avatar speech.
pub const MAX_USER_UTTERANCE_CHARS: usize = 200;
/// Both strings must be at least this long before prefixes are compared.
pub const MIN_PREFIX_CHARS: usize = 30;
/// Number of leading characters compared position by position.
pub const PREFIX_COMPARE_CHARS: usize = 80;
/// Matching fraction above which an utterance counts as echo.
pub const ECHO_MATCH_RATIO: f64 = 0.7;
/// Number of characters of each dispatched response kept in the guard.
pub const GUARD_PREFIX_CHARS: usize = 100;

/// What the orchestrator said last.
#[derive(Debug, Clone, Default)]
pub struct EchoGuard {
    last_response_prefix: String,
    recorded_at: Option<Instant>,
}

impl EchoGuard {
    /// Remembers the start of a response about to be spoken.
    pub fn record(&mut self, response: &str) {
        self.last_response_prefix = response.chars().take(GUARD_PREFIX_CHARS).collect();
        self.recorded_at = Some(Instant::now());
    }

    pub fn last_response_prefix(&self) -> &str {
        &self.last_response_prefix
    }

    pub fn recorded_at(&self) -> Option<Instant> {
        self.recorded_at
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EchoFilter;

impl EchoFilter {
    pub fn is_echo(&self, utterance: &str, guard: &EchoGuard) -> bool {
        if utterance.chars().count() > MAX_USER_UTTERANCE_CHARS {
            tracing::debug!("Utterance too long for a user question, treating as echo.");
            return true;
        }

        let prefix = guard.last_response_prefix();
        if prefix.chars().count() < MIN_PREFIX_CHARS
            || utterance.chars().count() < MIN_PREFIX_CHARS
        {
            return false;
        }

        let ratio = prefix_match_ratio(prefix, utterance);
        if ratio > ECHO_MATCH_RATIO {
            tracing::debug!(
                "Utterance matches last response ({:.2}), recorded {:?} ago.",
                ratio,
                guard.recorded_at().map(|t| t.elapsed())
            );
            return true;
        }
        false
    }
}

/// Fraction of equal positions among the first `PREFIX_COMPARE_CHARS`
/// characters of both strings, compared case-insensitively over the
/// shorter of the two.
fn prefix_match_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().take(PREFIX_COMPARE_CHARS).collect();
    let b: Vec<char> = b.chars().take(PREFIX_COMPARE_CHARS).collect();
    let compared = a.len().min(b.len());
    if compared == 0 {
        return 0.0;
    }
    // per-char lowering keeps positions aligned
    let matching = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| x.to_lowercase().eq(y.to_lowercase()))
        .count();
    matching as f64 / compared as f64
}
