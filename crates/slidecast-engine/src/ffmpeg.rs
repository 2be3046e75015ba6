//! ffmpeg-backed render backend.
//!
//! Builds a concat-demuxer list describing each slide and its display
//! duration, then shells out to ffmpeg to scale, pad and encode the
//! slideshow. Only the list generation is unit-tested; the invocation
//! itself needs ffmpeg on the machine.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use slidecast_models::{ArtifactRef, QualityTier};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::render::{RenderBackend, RenderRequest};

/// Output frame rate. Slides are still images, so a modest rate keeps
/// files small without visible difference.
const OUTPUT_FPS: u32 = 25;

/// Encoder settings for a quality tier.
fn encoder_settings(quality: QualityTier) -> (&'static str, &'static str) {
    match quality {
        QualityTier::Draft => ("ultrafast", "30"),
        QualityTier::Standard => ("medium", "23"),
        QualityTier::High => ("slow", "18"),
    }
}

/// Render backend that shells out to the `ffmpeg` binary.
pub struct FfmpegRenderer {
    ffmpeg_path: String,
}

impl FfmpegRenderer {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    /// Use a specific ffmpeg binary instead of whatever is on PATH.
    pub fn with_binary(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderBackend for FfmpegRenderer {
    async fn render(&self, request: &RenderRequest) -> EngineResult<ArtifactRef> {
        if request.slides.is_empty() {
            return Err(EngineError::render_failed("render plan has no slides"));
        }
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let concat_list = build_concat_list(request);
        let list_file = request.output_path.with_extension("slides.txt");
        tokio::fs::write(&list_file, concat_list).await?;

        let (width, height) = (request.dimensions.width, request.dimensions.height);
        let scale_filter = format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,fps={OUTPUT_FPS},format=yuv420p"
        );
        let (preset, crf) = encoder_settings(request.quality);

        debug!(
            output = %request.output_path.display(),
            slides = request.slides.len(),
            duration_secs = request.total_duration_secs(),
            preset,
            "Invoking ffmpeg"
        );

        let mut child = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_file)
            .arg("-vf")
            .arg(&scale_filter)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg(preset)
            .arg("-crf")
            .arg(crf)
            .arg("-movflags")
            .arg("+faststart")
            .arg(&request.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                EngineError::render_failed(format!("failed to spawn ffmpeg: {err}"))
            })?;

        let output = child.wait_with_output().await?;

        // Best effort; the list file is only scaffolding.
        let _ = tokio::fs::remove_file(&list_file).await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(EngineError::render_failed(format!(
                "ffmpeg exited with {}: {tail}",
                output.status
            )));
        }

        info!(output = %request.output_path.display(), "Video rendered");
        Ok(ArtifactRef::new(request.output_path.display().to_string()))
    }
}

/// Build the concat-demuxer list for a render plan.
///
/// The demuxer ignores the duration of the final entry, so the last
/// slide is repeated once without a duration to make it hold on screen
/// for its full length.
fn build_concat_list(request: &RenderRequest) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for slide in &request.slides {
        list.push_str(&format!(
            "file '{}'\nduration {:.3}\n",
            escape_concat_path(slide.image.path()),
            slide.duration_secs
        ));
    }
    if let Some(last) = request.slides.last() {
        list.push_str(&format!(
            "file '{}'\n",
            escape_concat_path(last.image.path())
        ));
    }
    list
}

/// Single quotes inside a quoted concat entry must be closed, escaped
/// and reopened.
fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}
