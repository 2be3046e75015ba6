//! Per-job execution pipeline.
//!
//! The executor turns one `Processing` job into its requested videos:
//! sample durations, pick images, decode them through the shared
//! cache, and hand a render plan to the backend. Failures of a single
//! video never abort the batch; the job only fails when nothing at all
//! could be produced.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use rand::seq::SliceRandom;
use rand::Rng;
use slidecast_models::{ImageRef, JobStatus, SlideshowJob};
use slidecast_queue::JobQueue;
use tracing::debug;

use crate::cache::ImageCache;
use crate::config::EngineConfig;
use crate::logging::JobLogger;
use crate::render::{ImageProvider, RenderBackend, RenderRequest, Slide};

/// Share of per-video progress spent on the image stage; the
/// remainder is the render stage.
const IMAGE_STAGE_SHARE: f32 = 90.0;

/// Final result of running one job to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// At least one video was produced. `error_log` is set when some
    /// attempts failed along the way.
    Completed {
        videos_ok: u32,
        error_log: Option<String>,
    },
    /// No video could be produced at all.
    Failed { error: String },
    /// The job was cancelled at a checkpoint.
    Cancelled,
}

/// Samples the total length and per-slide length for one video.
pub trait DurationPolicy: Send + Sync {
    /// Returns `(total_secs, per_slide_secs)`, both positive.
    fn sample(&self) -> (f64, f64);
}

/// Uniformly random durations within configured ranges.
///
/// The per-slide length is floored so a degenerate range can never
/// produce a zero-length slide (and with it an unbounded slide count).
pub struct UniformDurations {
    video_length_secs: (f64, f64),
    slide_length_secs: (f64, f64),
    min_slide_length_secs: f64,
}

impl UniformDurations {
    pub fn new(
        video_length_secs: (f64, f64),
        slide_length_secs: (f64, f64),
        min_slide_length_secs: f64,
    ) -> Self {
        Self {
            video_length_secs,
            slide_length_secs,
            min_slide_length_secs,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.video_length_secs,
            config.slide_length_secs,
            config.min_slide_length_secs,
        )
    }
}

fn sample_range(rng: &mut impl Rng, (low, high): (f64, f64)) -> f64 {
    if low >= high {
        low
    } else {
        rng.gen_range(low..=high)
    }
}

impl DurationPolicy for UniformDurations {
    fn sample(&self) -> (f64, f64) {
        let mut rng = rand::thread_rng();
        let total = sample_range(&mut rng, self.video_length_secs);
        let per_slide =
            sample_range(&mut rng, self.slide_length_secs).max(self.min_slide_length_secs);
        (total, per_slide)
    }
}

/// Number of slides needed to fill `total_secs` at `per_slide_secs`
/// each, rounded up, at least one.
pub fn slide_count(total_secs: f64, per_slide_secs: f64) -> usize {
    ((total_secs / per_slide_secs).ceil() as usize).max(1)
}

/// Runs one job end to end.
pub struct JobExecutor {
    queue: Arc<JobQueue>,
    cache: Arc<ImageCache>,
    provider: Arc<dyn ImageProvider>,
    backend: Arc<dyn RenderBackend>,
    durations: Arc<dyn DurationPolicy>,
    output_dir: PathBuf,
}

impl JobExecutor {
    pub fn new(
        queue: Arc<JobQueue>,
        cache: Arc<ImageCache>,
        provider: Arc<dyn ImageProvider>,
        backend: Arc<dyn RenderBackend>,
        durations: Arc<dyn DurationPolicy>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            queue,
            cache,
            provider,
            backend,
            durations,
            output_dir,
        }
    }

    /// Run a job that was already taken from the queue.
    ///
    /// Per-video progress and completed outputs are reported to the
    /// queue as they happen; the final status transition is left to
    /// the caller, which maps the returned outcome onto the queue.
    pub async fn run(&self, job: SlideshowJob) -> ExecutionOutcome {
        let logger = JobLogger::new(&job.id);
        logger.info(&format!(
            "Starting batch of {} video(s) from pool {}",
            job.videos_requested, job.image_pool
        ));

        let pool = match self.provider.list_candidate_images(&job.image_pool) {
            Ok(pool) if !pool.is_empty() => pool,
            Ok(_) => {
                return ExecutionOutcome::Failed {
                    error: format!("image pool {} contains no images", job.image_pool),
                }
            }
            Err(err) => {
                return ExecutionOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        let mut videos_ok = 0u32;
        let mut errors: Vec<String> = Vec::new();

        for video_index in 1..=job.videos_requested {
            if self.is_cancelled(&job) {
                logger.info("Cancellation observed, stopping batch");
                return ExecutionOutcome::Cancelled;
            }

            let video_logger = logger.for_video(video_index);
            match self
                .produce_video(&job, video_index, &pool, &video_logger)
                .await
            {
                VideoResult::Rendered => {
                    videos_ok += 1;
                    counter!("slidecast_videos_rendered_total").increment(1);
                }
                VideoResult::Failed(error) => {
                    video_logger.error(&format!("Video attempt failed: {error}"));
                    counter!("slidecast_videos_failed_total").increment(1);
                    errors.push(format!("video {video_index}: {error}"));
                }
                VideoResult::Cancelled => {
                    video_logger.info("Cancellation observed, stopping batch");
                    return ExecutionOutcome::Cancelled;
                }
            }
        }

        let error_log = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        if videos_ok == 0 && job.videos_requested > 0 {
            ExecutionOutcome::Failed {
                error: error_log.unwrap_or_else(|| "no videos produced".to_string()),
            }
        } else {
            logger.info(&format!(
                "Batch finished: {videos_ok}/{} video(s) produced",
                job.videos_requested
            ));
            ExecutionOutcome::Completed {
                videos_ok,
                error_log,
            }
        }
    }

    async fn produce_video(
        &self,
        job: &SlideshowJob,
        video_index: u32,
        pool: &[ImageRef],
        logger: &JobLogger,
    ) -> VideoResult {
        let (total_secs, per_slide_secs) = self.durations.sample();
        let count = slide_count(total_secs, per_slide_secs);
        debug!(
            job_id = %job.id,
            video_index,
            total_secs,
            per_slide_secs,
            slides = count,
            "Planned video"
        );

        let selected = select_images(pool, count);

        let mut slides = Vec::with_capacity(selected.len());
        for (i, image_ref) in selected.iter().enumerate() {
            match self.fetch_image(image_ref).await {
                Ok(_image) => slides.push(Slide {
                    image: image_ref.clone(),
                    duration_secs: per_slide_secs,
                }),
                Err(error) => {
                    logger.warn(&format!("Skipping image {image_ref}: {error}"));
                }
            }
            let progress = (i + 1) as f32 / selected.len() as f32 * IMAGE_STAGE_SHARE;
            self.queue
                .update_progress(&job.id, progress, Some("preparing images"));
        }

        if slides.is_empty() {
            return VideoResult::Failed("every selected image failed to decode".to_string());
        }

        if self.is_cancelled(job) {
            return VideoResult::Cancelled;
        }

        let request = RenderRequest {
            slides,
            dimensions: job.dimensions,
            quality: job.quality,
            output_path: self
                .output_dir
                .join(format!("{}_{video_index}.mp4", job.id)),
        };
        self.queue
            .update_progress(&job.id, IMAGE_STAGE_SHARE, Some("rendering"));

        match self.backend.render(&request).await {
            Ok(artifact) => {
                self.queue.record_video_completed(&job.id, artifact);
                VideoResult::Rendered
            }
            Err(err) => VideoResult::Failed(err.to_string()),
        }
    }

    /// Decode through the shared cache; misses populate it.
    async fn fetch_image(
        &self,
        image_ref: &ImageRef,
    ) -> Result<Arc<image::DynamicImage>, String> {
        if let Some(image) = self.cache.get(image_ref) {
            return Ok(image);
        }

        let provider = Arc::clone(&self.provider);
        let key = image_ref.clone();
        let decoded = tokio::task::spawn_blocking(move || provider.decode(&key))
            .await
            .map_err(|err| format!("decode task failed: {err}"))?
            .map_err(|err| err.to_string())?;

        self.cache.put(image_ref.clone(), Arc::clone(&decoded));
        Ok(decoded)
    }

    /// A job whose queue status is no longer `Processing` has been
    /// cancelled (or removed) out from under the executor.
    fn is_cancelled(&self, job: &SlideshowJob) -> bool {
        !matches!(self.queue.status_of(&job.id), Some(JobStatus::Processing))
    }
}

enum VideoResult {
    Rendered,
    Failed(String),
    Cancelled,
}

/// Pick `count` images from the pool.
///
/// When the pool is large enough the selection is without replacement,
/// so one video never shows the same image twice; smaller pools reuse
/// images as needed.
fn select_images(pool: &[ImageRef], count: usize) -> Vec<ImageRef> {
    let mut rng = rand::thread_rng();
    if pool.len() >= count {
        pool.choose_multiple(&mut rng, count).cloned().collect()
    } else {
        (0..count)
            .filter_map(|_| pool.choose(&mut rng).cloned())
            .collect()
    }
}
