//! Media value types shared between the executor and the render backend.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reference to a source image, usually a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub PathBuf);

impl ImageRef {
    /// Create from anything path-like.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Get the underlying path.
    pub fn path(&self) -> &std::path::Path {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

/// Identifier for a produced output artifact (e.g. a rendered video file).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Color format tag for a decoded image.
///
/// Used by the image cache to estimate the in-memory footprint of an
/// entry. Formats the engine does not recognize fall back to three
/// channels, which over-estimates grayscale and under-estimates
/// exotic formats but keeps the budget math conservative enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// Single-channel grayscale
    Gray,
    /// Single-channel grayscale, 16 bits per channel
    Gray16,
    /// Three-channel RGB
    #[default]
    Rgb,
    /// Three-channel RGB, 16 bits per channel
    Rgb16,
    /// Four-channel RGB with alpha
    Rgba,
    /// Four-channel RGBA, 16 bits per channel
    Rgba16,
    /// Four-channel CMYK
    Cmyk,
    /// Unrecognized format
    Unknown,
}

impl ColorFormat {
    /// Number of channels for this format.
    ///
    /// Unknown formats are treated as three-channel.
    pub fn channel_count(&self) -> u64 {
        match self {
            ColorFormat::Gray | ColorFormat::Gray16 => 1,
            ColorFormat::Rgb | ColorFormat::Rgb16 => 3,
            ColorFormat::Rgba | ColorFormat::Rgba16 | ColorFormat::Cmyk => 4,
            ColorFormat::Unknown => 3,
        }
    }

    /// Bytes per channel for this format.
    pub fn bytes_per_channel(&self) -> u64 {
        match self {
            ColorFormat::Gray16 | ColorFormat::Rgb16 | ColorFormat::Rgba16 => 2,
            _ => 1,
        }
    }
}

/// Output video dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoding quality tier passed opaquely to the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Fast, low-bitrate output for previews
    Draft,
    /// Balanced default
    #[default]
    Standard,
    /// Slow, high-bitrate output
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Draft => "draft",
            QualityTier::Standard => "standard",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts_follow_format_family() {
        assert_eq!(ColorFormat::Gray.channel_count(), 1);
        assert_eq!(ColorFormat::Rgb.channel_count(), 3);
        assert_eq!(ColorFormat::Rgba.channel_count(), 4);
        assert_eq!(ColorFormat::Cmyk.channel_count(), 4);
        assert_eq!(ColorFormat::Unknown.channel_count(), 3);
    }

    #[test]
    fn sixteen_bit_formats_use_two_bytes_per_channel() {
        assert_eq!(ColorFormat::Rgb.bytes_per_channel(), 1);
        assert_eq!(ColorFormat::Rgb16.bytes_per_channel(), 2);
        assert_eq!(ColorFormat::Gray16.bytes_per_channel(), 2);
    }

    #[test]
    fn image_ref_serde_is_transparent() {
        let image = ImageRef::new("/pool/a.jpg");
        let json = serde_json::to_string(&image).expect("serialize ImageRef");
        assert_eq!(json, "\"/pool/a.jpg\"");
    }

    #[test]
    fn dimensions_default_is_full_hd() {
        let dims = Dimensions::default();
        assert_eq!(dims.width, 1920);
        assert_eq!(dims.height, 1080);
        assert_eq!(dims.to_string(), "1920x1080");
    }
}
