use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Lifecycle of the avatar session as reported by the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Connecting,
    Connected,
    Disconnected,
}

/// Events a session provider emits back to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The avatar's video output is attached and playing.
    StreamReady,
    /// Speech-to-text result for whatever the microphone heard.
    UserTranscription { text: String },
}

/// Event names listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    StateChanged,
    StreamReady,
    UserTranscription,
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            Self::StateChanged(_) => SessionEventKind::StateChanged,
            Self::StreamReady => SessionEventKind::StreamReady,
            Self::UserTranscription { .. } => SessionEventKind::UserTranscription,
        }
    }
}

pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// A live avatar session. Implementations wrap a concrete avatar provider
/// so the orchestrator never depends on its SDK.
#[async_trait]
pub trait AvatarSession: Send + Sync {
    fn state(&self) -> SessionState;

    /// Whether the avatar's video output is ready to be shown.
    fn is_stream_ready(&self) -> bool;

    /// Connect command. Only meaningful from `SessionState::Inactive`.
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Registers `listener` for one event kind. The listener stays attached
    /// until the returned `Subscription` is disposed or dropped.
    fn subscribe(&self, kind: SessionEventKind, listener: Listener) -> Subscription;

    /// Speaks through the provider's full pipeline (its own language model).
    async fn message(&self, text: &str) -> Result<()>;

    /// Speaks `text` verbatim, bypassing any further language-model step.
    async fn repeat(&self, text: &str) -> Result<()>;

    /// Plays already-synthesized PCM audio through the avatar.
    async fn repeat_audio(&self, audio: Vec<u8>) -> Result<()>;
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, SessionEventKind, Listener)>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

/// Listener registry that session adapters embed to implement `subscribe`.
#[derive(Default, Clone)]
pub struct EventEmitter {
    registry: SharedRegistry,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SessionEventKind, listener: Listener) -> Subscription {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, kind, listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `event` to every listener of its kind, in subscription order.
    /// Listeners run outside the registry lock so they may subscribe or
    /// dispose re-entrantly.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .entries
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, l)| l.clone())
                .collect()
        };
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self, kind: SessionEventKind) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.entries.iter().filter(|(_, k, _)| *k == kind).count()
    }
}

/// Disposer for one listener registration.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Unsubscribes now. Equivalent to dropping the value.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.entries.retain(|(id, _, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = counter.clone();
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn emit_reaches_only_matching_kind() {
        let emitter = EventEmitter::new();
        let transcriptions = Arc::new(AtomicUsize::new(0));
        let states = Arc::new(AtomicUsize::new(0));
        let _a = emitter.subscribe(
            SessionEventKind::UserTranscription,
            counting_listener(&transcriptions),
        );
        let _b = emitter.subscribe(SessionEventKind::StateChanged, counting_listener(&states));

        emitter.emit(&SessionEvent::UserTranscription {
            text: "hello".into(),
        });

        assert_eq!(transcriptions.load(Ordering::SeqCst), 1);
        assert_eq!(states.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_detaches_listener() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = emitter.subscribe(SessionEventKind::StreamReady, counting_listener(&count));
        assert_eq!(emitter.listener_count(SessionEventKind::StreamReady), 1);

        sub.dispose();
        emitter.emit(&SessionEvent::StreamReady);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(SessionEventKind::StreamReady), 0);
    }

    #[test]
    fn subscription_outliving_emitter_is_harmless() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = emitter.subscribe(SessionEventKind::StreamReady, counting_listener(&count));
        drop(emitter);
        drop(sub);
    }

    #[test]
    fn listener_may_dispose_itself_while_handling() {
        let emitter = EventEmitter::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));

        let listener: Listener = {
            let slot = slot.clone();
            let count = count.clone();
            Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                slot.lock().unwrap().take();
            })
        };
        *slot.lock().unwrap() = Some(emitter.subscribe(SessionEventKind::StreamReady, listener));

        emitter.emit(&SessionEvent::StreamReady);
        emitter.emit(&SessionEvent::StreamReady);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
