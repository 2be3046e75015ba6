//! Shared data models for the slidecast batch engine.
//!
//! This crate defines the job entity tracked by the queue, the media
//! value types passed between the executor and the render backend,
//! and the progress arithmetic both sides agree on.

pub mod job;
pub mod media;

pub use job::{JobId, JobStatus, SlideshowJob};
pub use media::{ArtifactRef, ColorFormat, Dimensions, ImageRef, QualityTier};
