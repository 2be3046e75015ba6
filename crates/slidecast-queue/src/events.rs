//! Queue mutation events and listener registration.
//!
//! Events are delivered synchronously on the mutating thread, after
//! the queue's internal lock has been released. A slow listener slows
//! the caller down; it cannot deadlock the queue.

use slidecast_models::{ArtifactRef, JobId, JobStatus, SlideshowJob};

/// Opaque handle returned by `JobQueue::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Observer of queue mutations.
pub trait QueueListener: Send + Sync {
    fn on_event(&self, event: &QueueEvent);
}

/// One queue mutation.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job was submitted.
    Added { job: SlideshowJob },
    /// A job was handed to a worker and is now `Processing`.
    Started { job: SlideshowJob },
    /// The in-flight video made progress.
    Progress {
        id: JobId,
        current_video_progress: f32,
        overall_progress: f32,
        step: Option<String>,
    },
    /// One output video finished.
    VideoCompleted {
        id: JobId,
        output: ArtifactRef,
        videos_completed: u32,
    },
    /// A job's status changed (terminal transitions included).
    StatusChanged {
        id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
    /// A job was removed from the registry.
    Removed { id: JobId },
    /// Terminal jobs were cleared in bulk.
    Cleared { removed: usize },
}

impl QueueEvent {
    /// The job this event concerns, if it concerns exactly one.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::Added { job } | QueueEvent::Started { job } => Some(&job.id),
            QueueEvent::Progress { id, .. }
            | QueueEvent::VideoCompleted { id, .. }
            | QueueEvent::StatusChanged { id, .. }
            | QueueEvent::Removed { id } => Some(id),
            QueueEvent::Cleared { .. } => None,
        }
    }
}
