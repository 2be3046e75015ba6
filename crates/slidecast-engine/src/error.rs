//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("No usable images: {0}")]
    NoUsableImages(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    pub fn no_usable_images(msg: impl Into<String>) -> Self {
        Self::NoUsableImages(msg.into())
    }
}
