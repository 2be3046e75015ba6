//! Job identity and state for batch slideshow generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{ArtifactRef, Dimensions, QualityTier};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Pending,
    /// Job holds a worker slot and is being processed
    Processing,
    /// Job finished with at least one video produced
    Completed,
    /// Job finished with no usable output
    Failed,
    /// Job was cancelled before finishing
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One batch request to generate N slideshow videos from an image pool.
///
/// The queue owns the job once it is submitted; everything here is a
/// tracked record, not live execution state. `videos_completed` and
/// `current_video_progress` advance while the job is `Processing` and
/// freeze once a terminal status is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideshowJob {
    /// Unique job ID
    pub id: JobId,

    /// Higher priority is served first
    #[serde(default)]
    pub priority: i32,

    /// Submission timestamp, FIFO tie-break within a priority tier
    pub created_at: DateTime<Utc>,

    /// Current queue state
    #[serde(default)]
    pub status: JobStatus,

    /// Opaque reference to the source image pool (e.g. a directory)
    pub image_pool: String,

    /// Number of output videos to produce
    pub videos_requested: u32,

    /// Number of output videos produced so far
    #[serde(default)]
    pub videos_completed: u32,

    /// Progress of the in-flight video, 0-100
    #[serde(default)]
    pub current_video_progress: f32,

    /// Human-readable description of the current processing step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Output dimensions for every video in the album
    #[serde(default)]
    pub dimensions: Dimensions,

    /// Encoding quality tier
    #[serde(default)]
    pub quality: QualityTier,

    /// Error log, set when any video attempt failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Set on entering `Processing`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on entering any terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Produced artifact identifiers, in completion order
    #[serde(default)]
    pub generated_outputs: Vec<ArtifactRef>,
}

impl SlideshowJob {
    /// Create a new pending job.
    pub fn new(image_pool: impl Into<String>, videos_requested: u32) -> Self {
        Self {
            id: JobId::new(),
            priority: 0,
            created_at: Utc::now(),
            status: JobStatus::Pending,
            image_pool: image_pool.into(),
            videos_requested,
            videos_completed: 0,
            current_video_progress: 0.0,
            current_step: None,
            dimensions: Dimensions::default(),
            quality: QualityTier::default(),
            error_message: None,
            started_at: None,
            completed_at: None,
            generated_outputs: Vec::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set the quality tier.
    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job as processing.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Mark the job as completed.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.current_video_progress = 0.0;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job as cancelled.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Record one finished video.
    pub fn record_video_completed(&mut self, output: ArtifactRef) {
        self.videos_completed = (self.videos_completed + 1).min(self.videos_requested);
        self.current_video_progress = 0.0;
        self.generated_outputs.push(output);
    }

    /// Overall job progress, 0-100.
    ///
    /// Completed videos count in full; the in-flight video contributes
    /// its fractional progress. Clamped so rounding can never report
    /// more than 100.
    pub fn overall_progress(&self) -> f32 {
        if self.videos_requested == 0 {
            return 100.0;
        }
        if self.status == JobStatus::Completed {
            return 100.0;
        }
        let done = self.videos_completed as f32 + self.current_video_progress / 100.0;
        (done / self.videos_requested as f32 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = SlideshowJob::new("/pool", 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.videos_completed, 0);
        assert!(job.started_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn status_transitions_stamp_timestamps() {
        let mut job = SlideshowJob::new("/pool", 1);

        job.start();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.complete();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn overall_progress_combines_completed_and_in_flight() {
        let mut job = SlideshowJob::new("/pool", 4);
        job.start();
        job.record_video_completed(ArtifactRef::new("out0.mp4"));
        job.current_video_progress = 50.0;

        // 1 full video + half of the second, out of 4
        assert!((job.overall_progress() - 37.5).abs() < 0.01);
    }

    #[test]
    fn overall_progress_is_clamped() {
        let mut job = SlideshowJob::new("/pool", 1);
        job.videos_completed = 1;
        job.current_video_progress = 90.0;
        assert_eq!(job.overall_progress(), 100.0);
    }

    #[test]
    fn record_video_completed_caps_at_requested() {
        let mut job = SlideshowJob::new("/pool", 1);
        job.record_video_completed(ArtifactRef::new("a.mp4"));
        job.record_video_completed(ArtifactRef::new("b.mp4"));
        assert_eq!(job.videos_completed, 1);
        assert_eq!(job.generated_outputs.len(), 2);
    }

    #[test]
    fn job_serde_roundtrip() {
        let mut job = SlideshowJob::new("/pool", 2).with_priority(5);
        job.start();

        let json = serde_json::to_string(&job).expect("serialize job");
        let decoded: SlideshowJob = serde_json::from_str(&json).expect("deserialize job");

        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.priority, 5);
        assert_eq!(decoded.status, JobStatus::Processing);
        assert_eq!(decoded.videos_requested, 2);
    }
}
