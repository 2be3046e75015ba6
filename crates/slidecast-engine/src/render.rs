//! Render seam between the executor and the encoding backend.
//!
//! The executor plans a video (which images, how long each is shown)
//! and hands the plan to a [`RenderBackend`]. Keeping the backend
//! behind a trait lets tests run the full pipeline without ffmpeg on
//! the machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use slidecast_models::{ArtifactRef, Dimensions, ImageRef, QualityTier};
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// File extensions accepted as source images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tiff", "tif"];

/// One slide in a planned video.
#[derive(Debug, Clone)]
pub struct Slide {
    /// Source image for the slide
    pub image: ImageRef,
    /// How long the slide stays on screen, seconds
    pub duration_secs: f64,
}

/// Complete plan for rendering one output video.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Ordered slides
    pub slides: Vec<Slide>,
    /// Output frame size
    pub dimensions: Dimensions,
    /// Encoding quality tier
    pub quality: QualityTier,
    /// Destination path for the encoded file
    pub output_path: PathBuf,
}

impl RenderRequest {
    /// Total planned duration, seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.slides.iter().map(|s| s.duration_secs).sum()
    }
}

/// Encodes a planned video into an output artifact.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> EngineResult<ArtifactRef>;
}

/// Supplies candidate images for a job's image pool and decodes them.
///
/// Listing and decoding are synchronous; callers run them on blocking
/// threads when needed.
pub trait ImageProvider: Send + Sync {
    /// Enumerate candidate images for a pool reference.
    fn list_candidate_images(&self, pool: &str) -> EngineResult<Vec<ImageRef>>;

    /// Decode one image to pixels.
    fn decode(&self, image: &ImageRef) -> EngineResult<Arc<DynamicImage>>;
}

/// Filesystem-backed provider: the pool reference is a directory and
/// candidates are its image files, sorted by name for determinism.
#[derive(Debug, Default)]
pub struct DirectoryImageProvider;

impl DirectoryImageProvider {
    pub fn new() -> Self {
        Self
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

impl ImageProvider for DirectoryImageProvider {
    fn list_candidate_images(&self, pool: &str) -> EngineResult<Vec<ImageRef>> {
        let dir = Path::new(pool);
        if !dir.is_dir() {
            return Err(EngineError::no_usable_images(format!(
                "image pool is not a directory: {pool}"
            )));
        }

        let mut images = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(pool, error = %err, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() && has_image_extension(&path) {
                images.push(ImageRef::new(path));
            }
        }
        images.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(images)
    }

    fn decode(&self, image: &ImageRef) -> EngineResult<Arc<DynamicImage>> {
        let decoded = image::open(image.path())
            .map_err(|err| EngineError::image_decode(format!("{}: {err}", image)))?;
        Ok(Arc::new(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    #[test]
    fn listing_filters_and_sorts_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["c.png", "a.JPG", "b.jpeg", "notes.txt", "clip.mp4"] {
            File::create(dir.path().join(name)).expect("create file");
        }
        std::fs::create_dir(dir.path().join("sub.png")).expect("create dir");

        let provider = DirectoryImageProvider::new();
        let images = provider
            .list_candidate_images(dir.path().to_str().expect("utf8 path"))
            .expect("list images");

        let names: Vec<_> = images
            .iter()
            .map(|i| i.path().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.JPG", "b.jpeg", "c.png"]);
    }

    #[test]
    fn missing_pool_directory_is_an_error() {
        let provider = DirectoryImageProvider::new();
        let result = provider.list_candidate_images("/nonexistent/slidecast-pool");
        assert!(matches!(result, Err(EngineError::NoUsableImages(_))));
    }

    #[test]
    fn decode_failure_names_the_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.png");
        let mut file = File::create(&path).expect("create file");
        file.write_all(b"not a png").expect("write");

        let provider = DirectoryImageProvider::new();
        let err = provider
            .decode(&ImageRef::new(path.clone()))
            .expect_err("decode should fail");
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn render_request_sums_durations() {
        let request = RenderRequest {
            slides: vec![
                Slide {
                    image: ImageRef::new("/pool/a.png"),
                    duration_secs: 2.5,
                },
                Slide {
                    image: ImageRef::new("/pool/b.png"),
                    duration_secs: 3.0,
                },
            ],
            dimensions: Dimensions::default(),
            quality: QualityTier::Standard,
            output_path: PathBuf::from("/tmp/out.mp4"),
        };
        assert!((request.total_duration_secs() - 5.5).abs() < 1e-9);
    }
}
