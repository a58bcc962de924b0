use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Failures raised while acquiring a source or producing a still frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("no camera device available")]
    NoDevice,
    #[error("video stream did not become ready in time")]
    NotReady,
    #[error("video stream reported zero dimensions")]
    NoDimensions,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Which way the camera faces. Rear is preferred because the user points
/// the device at the thing they are asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Rear,
    Front,
}

/// Readiness snapshot published by a live stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReadiness {
    pub metadata_loaded: bool,
    pub width: u32,
    pub height: u32,
}

impl StreamReadiness {
    pub fn is_ready(&self) -> bool {
        self.metadata_loaded && self.width > 0 && self.height > 0
    }
}

/// A single raw RGB8 raster grabbed from a live stream.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A live video stream handle as yielded by the platform's media capture.
pub trait VideoStream: Send + Sync {
    /// Watch channel carrying the stream's readiness; receivers can await it.
    fn readiness(&self) -> watch::Receiver<StreamReadiness>;

    /// Renders the current frame into a raster buffer.
    fn grab_frame(&self) -> Result<RgbFrame, CaptureError>;

    /// Stops every underlying track. Must release hardware before returning.
    fn stop(&self);
}

/// Access to camera hardware.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: Facing) -> Result<Arc<dyn VideoStream>, CaptureError>;
}

/// Camera device for hosts without any camera backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCamera;

#[async_trait]
impl CameraDevice for UnavailableCamera {
    async fn open(&self, _facing: Facing) -> Result<Arc<dyn VideoStream>, CaptureError> {
        Err(CaptureError::NoDevice)
    }
}

/// Raw image bytes plus their content type, used as the fallback source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImage {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl StaticImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Loads an image file, inferring the content type from its extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read fallback image: {}", path.display()))?;
        if bytes.is_empty() {
            anyhow::bail!("Fallback image is empty: {}", path.display());
        }
        Ok(Self::new(bytes, content_type_for(path)))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// The thing frames are taken from. Cloning shares the underlying handle.
#[derive(Clone)]
pub enum FrameSource {
    Camera(Arc<dyn VideoStream>),
    StaticImage(StaticImage),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera(_) => f.write_str("FrameSource::Camera"),
            Self::StaticImage(img) => write!(
                f,
                "FrameSource::StaticImage({}, {} bytes)",
                img.content_type,
                img.bytes.len()
            ),
        }
    }
}

/// Owns the active frame source for one camera-mode interval.
#[derive(Debug)]
pub struct CaptureSource {
    source: Option<FrameSource>,
    fell_back: bool,
}

impl CaptureSource {
    /// Acquires a camera, rear-facing first, then front-facing. When neither
    /// opens, falls back to `fallback` without surfacing an error. Only fails
    /// with `NoDevice` when there is no fallback either.
    pub async fn activate(
        camera: &dyn CameraDevice,
        fallback: Option<StaticImage>,
    ) -> Result<Self, CaptureError> {
        for facing in [Facing::Rear, Facing::Front] {
            match camera.open(facing).await {
                Ok(stream) => {
                    tracing::info!("Camera opened ({:?} facing).", facing);
                    return Ok(Self {
                        source: Some(FrameSource::Camera(stream)),
                        fell_back: false,
                    });
                }
                Err(e) => tracing::debug!("Could not open {:?} camera: {}", facing, e),
            }
        }

        match fallback {
            Some(image) => {
                tracing::warn!(
                    "No camera available, using fallback image ({}).",
                    image.content_type
                );
                Ok(Self {
                    source: Some(FrameSource::StaticImage(image)),
                    fell_back: true,
                })
            }
            None => Err(CaptureError::NoDevice),
        }
    }

    pub fn current_frame_source(&self) -> Option<FrameSource> {
        self.source.clone()
    }

    pub fn is_fallback(&self) -> bool {
        self.fell_back
    }

    /// Releases the stream. Safe to call more than once.
    pub fn deactivate(&mut self) {
        if let Some(FrameSource::Camera(stream)) = self.source.take() {
            stream.stop();
            tracing::info!("Camera stream stopped.");
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory stream whose readiness the test drives by hand.
    pub struct FakeStream {
        pub readiness_tx: watch::Sender<StreamReadiness>,
        pub stops: AtomicUsize,
        pub grabs: AtomicUsize,
        /// Overrides the pixel buffer length of grabbed frames.
        pub pixel_len: Option<usize>,
    }

    impl FakeStream {
        pub fn new(initial: StreamReadiness) -> Arc<Self> {
            let (readiness_tx, _) = watch::channel(initial);
            Arc::new(Self {
                readiness_tx,
                stops: AtomicUsize::new(0),
                grabs: AtomicUsize::new(0),
                pixel_len: None,
            })
        }

        /// Ready stream whose frames carry `pixel_len` bytes regardless of
        /// the reported dimensions.
        pub fn truncated(width: u32, height: u32, pixel_len: usize) -> Arc<Self> {
            let (readiness_tx, _) = watch::channel(StreamReadiness {
                metadata_loaded: true,
                width,
                height,
            });
            Arc::new(Self {
                readiness_tx,
                stops: AtomicUsize::new(0),
                grabs: AtomicUsize::new(0),
                pixel_len: Some(pixel_len),
            })
        }

        pub fn ready(width: u32, height: u32) -> Arc<Self> {
            Self::new(StreamReadiness {
                metadata_loaded: true,
                width,
                height,
            })
        }

        pub fn set_ready(&self, width: u32, height: u32) {
            self.readiness_tx.send_replace(StreamReadiness {
                metadata_loaded: true,
                width,
                height,
            });
        }
    }

    impl VideoStream for FakeStream {
        fn readiness(&self) -> watch::Receiver<StreamReadiness> {
            self.readiness_tx.subscribe()
        }

        fn grab_frame(&self) -> Result<RgbFrame, CaptureError> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            let r = *self.readiness_tx.borrow();
            let len = self
                .pixel_len
                .unwrap_or((r.width * r.height * 3) as usize);
            Ok(RgbFrame {
                width: r.width,
                height: r.height,
                pixels: vec![128; len],
            })
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Camera that hands out a prepared stream for the listed facings only.
    pub struct FakeCamera {
        pub stream: Option<Arc<FakeStream>>,
        pub available: Vec<Facing>,
        pub attempts: Mutex<Vec<Facing>>,
    }

    impl FakeCamera {
        pub fn with(stream: Arc<FakeStream>, available: Vec<Facing>) -> Self {
            Self {
                stream: Some(stream),
                available,
                attempts: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl CameraDevice for FakeCamera {
        async fn open(&self, facing: Facing) -> Result<Arc<dyn VideoStream>, CaptureError> {
            self.attempts.lock().unwrap().push(facing);
            match &self.stream {
                Some(stream) if self.available.contains(&facing) => {
                    Ok(stream.clone() as Arc<dyn VideoStream>)
                }
                _ => Err(CaptureError::NoDevice),
            }
        }
    }

    pub fn jpeg_fallback() -> StaticImage {
        StaticImage::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00], "image/jpeg")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn prefers_rear_camera() {
        let stream = FakeStream::ready(4, 4);
        let camera = FakeCamera::with(stream, vec![Facing::Rear, Facing::Front]);

        let source = CaptureSource::activate(&camera, None).await.unwrap();

        assert!(matches!(
            source.current_frame_source(),
            Some(FrameSource::Camera(_))
        ));
        assert_eq!(*camera.attempts.lock().unwrap(), vec![Facing::Rear]);
    }

    #[tokio::test]
    async fn falls_back_to_front_camera() {
        let stream = FakeStream::ready(4, 4);
        let camera = FakeCamera::with(stream, vec![Facing::Front]);

        let source = CaptureSource::activate(&camera, None).await.unwrap();

        assert!(!source.is_fallback());
        assert_eq!(
            *camera.attempts.lock().unwrap(),
            vec![Facing::Rear, Facing::Front]
        );
    }

    #[tokio::test]
    async fn no_camera_uses_static_fallback() {
        let source = CaptureSource::activate(&UnavailableCamera, Some(jpeg_fallback()))
            .await
            .unwrap();

        assert!(source.is_fallback());
        match source.current_frame_source() {
            Some(FrameSource::StaticImage(img)) => assert_eq!(img.content_type, "image/jpeg"),
            other => panic!("expected static image, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_camera_and_no_fallback_is_no_device() {
        let result = CaptureSource::activate(&UnavailableCamera, None).await;
        assert_eq!(result.unwrap_err(), CaptureError::NoDevice);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent_and_stops_once() {
        let stream = FakeStream::ready(4, 4);
        let camera = FakeCamera::with(stream.clone(), vec![Facing::Rear]);
        let mut source = CaptureSource::activate(&camera, None).await.unwrap();

        source.deactivate();
        source.deactivate();
        drop(source);

        assert_eq!(stream.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_image_from_path_infers_content_type() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("desk.PNG");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&[0x89, b'P', b'N', b'G'])?;

        let image = StaticImage::from_path(&path)?;

        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes.len(), 4);
        Ok(())
    }

    #[test]
    fn static_image_from_missing_path_fails() {
        assert!(StaticImage::from_path(Path::new("no_such_fallback.jpg")).is_err());
    }
}
