use anyhow::{Context, Result};
use async_trait::async_trait;
use sightline_core::session::{
    AvatarSession, EventEmitter, Listener, SessionEvent, SessionEventKind, SessionState,
    Subscription,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Sample rate of the PCM the speech route returns.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
/// How long a looped-back utterance takes to come back as a transcription.
const LOOPBACK_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    /// Feed everything the avatar says back in as a user transcription,
    /// the way a speaker next to a microphone would.
    pub loopback: bool,
    /// Where synthesized audio clips are written as WAV files.
    pub audio_dir: Option<PathBuf>,
}

/// An `AvatarSession` that renders the avatar as text on a terminal. Typed
/// lines become user transcriptions.
pub struct ConsoleSession {
    emitter: EventEmitter,
    state: Mutex<SessionState>,
    stream_ready: AtomicBool,
    options: ConsoleOptions,
    clips: AtomicUsize,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSession {
    pub fn new(options: ConsoleOptions) -> Self {
        Self::with_writer(options, Box::new(std::io::stdout()))
    }

    pub fn with_writer(options: ConsoleOptions, out: Box<dyn Write + Send>) -> Self {
        Self {
            emitter: EventEmitter::new(),
            state: Mutex::new(SessionState::Inactive),
            stream_ready: AtomicBool::new(false),
            options,
            clips: AtomicUsize::new(0),
            out: Mutex::new(out),
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.emitter.emit(&SessionEvent::StateChanged(state));
    }

    /// Delivers a line of user speech.
    pub fn transcribe(&self, text: &str) {
        self.emitter.emit(&SessionEvent::UserTranscription {
            text: text.to_string(),
        });
    }

    /// Simulates the provider dropping the connection.
    pub fn disconnect(&self) {
        self.stream_ready.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Disconnected);
    }

    fn print(&self, line: &str) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    fn loop_back(&self, text: &str) {
        if !self.options.loopback {
            return;
        }
        let emitter = self.emitter.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(LOOPBACK_DELAY).await;
            tracing::debug!("Looping avatar speech back as a transcription.");
            emitter.emit(&SessionEvent::UserTranscription { text });
        });
    }

    fn write_clip(&self, dir: &Path, audio: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create audio directory {}", dir.display()))?;
        let n = self.clips.fetch_add(1, Ordering::SeqCst) + 1;
        let path = dir.join(format!("reply-{n:04}.wav"));
        write_wav(&path, audio)?;
        Ok(path)
    }
}

/// Writes 16-bit little-endian mono PCM as a WAV file.
pub fn write_wav(path: &Path, pcm: &[u8]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SPEECH_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    if pcm.len() % 2 != 0 {
        tracing::warn!(
            "PCM clip has an odd length ({} bytes); dropping the trailing byte.",
            pcm.len()
        );
    }
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}

#[async_trait]
impl AvatarSession for ConsoleSession {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stream_ready(&self) -> bool {
        self.stream_ready.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<()> {
        self.set_state(SessionState::Connecting);
        self.set_state(SessionState::Connected);
        self.stream_ready.store(true, Ordering::SeqCst);
        self.emitter.emit(&SessionEvent::StreamReady);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stream_ready.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    fn subscribe(&self, kind: SessionEventKind, listener: Listener) -> Subscription {
        self.emitter.subscribe(kind, listener)
    }

    async fn message(&self, text: &str) -> Result<()> {
        // There is no provider-side language model here; the text is spoken as is.
        self.repeat(text).await
    }

    async fn repeat(&self, text: &str) -> Result<()> {
        self.print(&format!("avatar> {text}"))?;
        self.loop_back(text);
        Ok(())
    }

    async fn repeat_audio(&self, audio: Vec<u8>) -> Result<()> {
        match &self.options.audio_dir {
            Some(dir) => {
                let path = self.write_clip(dir, &audio)?;
                self.print(&format!("avatar> [audio: {}]", path.display()))
            }
            None => self.print(&format!("avatar> [audio: {} bytes]", audio.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn session(options: ConsoleOptions) -> (ConsoleSession, SharedBuf) {
        let buf = SharedBuf::default();
        (ConsoleSession::with_writer(options, Box::new(buf.clone())), buf)
    }

    fn record(session: &ConsoleSession, kind: SessionEventKind) -> (Arc<Mutex<Vec<SessionEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = session.subscribe(
            kind,
            Arc::new(move |event: &SessionEvent| sink.lock().unwrap().push(event.clone())),
        );
        (seen, sub)
    }

    #[tokio::test]
    async fn start_connects_and_readies_stream() {
        let (session, _) = session(ConsoleOptions::default());
        let (states, _sub) = record(&session, SessionEventKind::StateChanged);

        session.start().await.unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_stream_ready());
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                SessionEvent::StateChanged(SessionState::Connecting),
                SessionEvent::StateChanged(SessionState::Connected),
            ]
        );

        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_stream_ready());
    }

    #[tokio::test]
    async fn repeat_prints_to_console() {
        let (session, buf) = session(ConsoleOptions::default());
        session.repeat("I see a lamp.").await.unwrap();
        session.message("Hello!").await.unwrap();
        assert_eq!(buf.contents(), "avatar> I see a lamp.\navatar> Hello!\n");
    }

    #[tokio::test(start_paused = true)]
    async fn loopback_feeds_speech_back_as_transcription() {
        let (session, _) = session(ConsoleOptions {
            loopback: true,
            audio_dir: None,
        });
        let (heard, _sub) = record(&session, SessionEventKind::UserTranscription);

        session.repeat("There is a red mug on the desk.").await.unwrap();
        assert!(heard.lock().unwrap().is_empty());

        tokio::time::sleep(LOOPBACK_DELAY * 2).await;
        assert_eq!(
            *heard.lock().unwrap(),
            vec![SessionEvent::UserTranscription {
                text: "There is a red mug on the desk.".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn audio_is_written_as_wav() {
        let dir = tempfile::tempdir().unwrap();
        let (session, buf) = session(ConsoleOptions {
            loopback: false,
            audio_dir: Some(dir.path().join("clips")),
        });

        let pcm: Vec<u8> = [0i16, 1000, -1000, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        session.repeat_audio(pcm).await.unwrap();

        let path = dir.path().join("clips").join("reply-0001.wav");
        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, SPEECH_SAMPLE_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
        assert!(buf.contents().contains("reply-0001.wav"));
    }

    #[tokio::test]
    async fn audio_without_directory_is_only_reported() {
        let (session, buf) = session(ConsoleOptions::default());
        session.repeat_audio(vec![0; 48]).await.unwrap();
        assert_eq!(buf.contents(), "avatar> [audio: 48 bytes]\n");
    }

    #[test]
    fn odd_length_pcm_drops_trailing_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.wav");
        let mut pcm: Vec<u8> = 1234i16.to_le_bytes().to_vec();
        pcm.push(0x7F);

        write_wav(&path, &pcm).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1234]);
    }
}
