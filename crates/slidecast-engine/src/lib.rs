//! Batch slideshow generation engine.
//!
//! Ties the job queue to the media pipeline: a resizable worker pool
//! takes jobs, an executor plans and renders each video, decoded
//! images are shared through a bounded cache, and a resource monitor
//! advises on admission and pool sizing.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod ffmpeg;
pub mod logging;
pub mod processor;
pub mod render;
pub mod resources;

pub use cache::{CacheStats, ImageCache};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use executor::{DurationPolicy, ExecutionOutcome, JobExecutor, UniformDurations};
pub use ffmpeg::FfmpegRenderer;
pub use logging::JobLogger;
pub use processor::{BatchProcessor, PoolState, ProcessorStatistics};
pub use render::{
    DirectoryImageProvider, ImageProvider, RenderBackend, RenderRequest, Slide,
};
pub use resources::{ResourceMonitor, ResourceSnapshot};
