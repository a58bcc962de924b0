use crate::capture::{CaptureError, FrameSource, RgbFrame, VideoStream};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::sync::Arc;
use std::time::Duration;

pub const JPEG_QUALITY: u8 = 95;

/// An encoded still image ready to be sent for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

/// Produces single still images from a `FrameSource`.
#[derive(Debug, Clone, Copy)]
pub struct FrameCapture {
    timeout: Duration,
}

impl FrameCapture {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Static images are returned as-is. Live streams are awaited until they
    /// report metadata and non-zero dimensions, then exactly one frame is
    /// rendered and encoded as JPEG.
    pub async fn capture(&self, source: &FrameSource) -> Result<Image, CaptureError> {
        match source {
            FrameSource::StaticImage(image) => Ok(Image {
                bytes: image.bytes.clone(),
                content_type: image.content_type.clone(),
            }),
            FrameSource::Camera(stream) => {
                self.wait_ready(stream.as_ref()).await?;
                let frame = stream.grab_frame()?;
                encode_jpeg(&frame)
            }
        }
    }

    /// Waits for the stream's readiness, bounded by the capture timeout.
    pub async fn wait_ready(&self, stream: &dyn VideoStream) -> Result<(), CaptureError> {
        let mut readiness = stream.readiness();
        let waited = tokio::time::timeout(self.timeout, async {
            readiness.wait_for(|r| r.is_ready()).await.is_ok()
        })
        .await;
        match waited {
            Ok(true) => Ok(()),
            // sender dropped: the stream went away before it was ever ready
            Ok(false) => Err(CaptureError::NotReady),
            Err(_) => {
                tracing::warn!("Video stream not ready after {:?}.", self.timeout);
                Err(CaptureError::NotReady)
            }
        }
    }
}

fn encode_jpeg(frame: &RgbFrame) -> Result<Image, CaptureError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::NoDimensions);
    }
    let expected = u64::from(frame.width) * u64::from(frame.height) * 3;
    if frame.pixels.len() as u64 != expected {
        return Err(CaptureError::Encode(format!(
            "{}x{} frame carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.pixels.len(),
            expected
        )));
    }

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .write_image(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    tracing::debug!(
        "Captured {}x{} frame ({} bytes).",
        frame.width,
        frame.height,
        bytes.len()
    );
    Ok(Image {
        bytes: bytes.into(),
        content_type: "image/jpeg".to_string(),
    })
}
