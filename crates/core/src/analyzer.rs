use crate::frame::Image;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

// Boundary to whatever model turns a frame into a spoken answer. The
// coordinator only depends on this trait; `BackendClient` is the HTTP
// implementation and tests substitute `MockVisionAnalyzer`.
//
// An empty `question` asks for a general description of the image.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: Image, question: String) -> Result<String>;
}
