//! Structured job logging.
//!
//! Batch jobs produce several videos; log lines carry the job id and,
//! where relevant, which video of the batch they refer to, so the
//! output of concurrent jobs stays attributable.

use tracing::{error, info, warn};

use slidecast_models::JobId;

/// Logger bound to one job, optionally scoped to one video of the
/// batch.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    video_index: Option<u32>,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
            video_index: None,
        }
    }

    /// Derive a logger scoped to one video of the batch (1-based).
    pub fn for_video(&self, video_index: u32) -> Self {
        Self {
            job_id: self.job_id.clone(),
            video_index: Some(video_index),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn info(&self, message: &str) {
        match self.video_index {
            Some(video) => info!(job_id = %self.job_id, video, "{message}"),
            None => info!(job_id = %self.job_id, "{message}"),
        }
    }

    pub fn warn(&self, message: &str) {
        match self.video_index {
            Some(video) => warn!(job_id = %self.job_id, video, "{message}"),
            None => warn!(job_id = %self.job_id, "{message}"),
        }
    }

    pub fn error(&self, message: &str) {
        match self.video_index {
            Some(video) => error!(job_id = %self.job_id, video, "{message}"),
            None => error!(job_id = %self.job_id, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_carries_job_id() {
        let id = JobId::new();
        let logger = JobLogger::new(&id);
        assert_eq!(logger.job_id(), id.to_string());
    }

    #[test]
    fn video_scope_keeps_job_id() {
        let id = JobId::new();
        let logger = JobLogger::new(&id).for_video(2);
        assert_eq!(logger.job_id(), id.to_string());
        assert_eq!(logger.video_index, Some(2));
    }
}
