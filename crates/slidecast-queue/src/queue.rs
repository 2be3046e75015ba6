//! Priority-ordered job store.
//!
//! A single mutex guards the job registry and the pending heap.
//! Critical sections never do I/O and never invoke listeners; events
//! are collected under the lock and delivered after it is released.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use tracing::{debug, warn};

use slidecast_models::{ArtifactRef, JobId, JobStatus, SlideshowJob};

use crate::events::{ListenerId, QueueEvent, QueueListener};
use crate::snapshot::QueueSnapshot;

/// Heap key for a pending job.
///
/// Ordered so the heap's maximum is the next job to dispatch: higher
/// priority first, then earlier submission (lower sequence number),
/// then job id for a stable total order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingKey {
    priority: i32,
    seq: u64,
    id: JobId,
}

impl Ord for PendingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for PendingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    jobs: HashMap<JobId, SlideshowJob>,
    pending: BinaryHeap<PendingKey>,
    next_seq: u64,
    total_added: u64,
    total_completed: u64,
    total_failed: u64,
}

/// Queue counters returned by `JobQueue::statistics`.
#[derive(Debug, Clone, Default)]
pub struct QueueStatistics {
    /// Jobs currently tracked (any status)
    pub total: usize,
    /// Count per status
    pub by_status: HashMap<JobStatus, usize>,
    /// Jobs currently eligible for dispatch
    pub pending_count: usize,
    /// Jobs ever submitted
    pub total_added: u64,
    /// Jobs that reached `Completed`
    pub total_completed: u64,
    /// Jobs that reached `Failed`
    pub total_failed: u64,
}

/// Thread-safe priority job queue.
///
/// Jobs are dispatched highest priority first, FIFO within a priority
/// tier. Cancelled pending jobs leave stale heap entries behind; they
/// are skipped lazily on the next `take_next`.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    listeners: Mutex<Vec<(ListenerId, std::sync::Arc<dyn QueueListener>)>>,
    next_listener_id: AtomicU64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a pending job.
    ///
    /// # Panics
    ///
    /// Panics if a job with the same id is already tracked. Duplicate
    /// ids are a caller bug, not a runtime condition.
    pub fn submit(&self, mut job: SlideshowJob) {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            assert!(
                !inner.jobs.contains_key(&job.id),
                "duplicate job id submitted: {}",
                job.id
            );

            job.status = JobStatus::Pending;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.push(PendingKey {
                priority: job.priority,
                seq,
                id: job.id.clone(),
            });
            inner.total_added += 1;
            let snapshot = job.clone();
            inner.jobs.insert(job.id.clone(), job);
            QueueEvent::Added { job: snapshot }
        };
        debug!(job_id = %event.job_id().unwrap(), "Job submitted");
        self.notify(&event);
    }

    /// Pop the best-ranked pending job, marking it `Processing`.
    ///
    /// Non-blocking; returns `None` when nothing is eligible.
    pub fn take_next(&self) -> Option<SlideshowJob> {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            loop {
                let key = inner.pending.pop()?;
                match inner.jobs.get_mut(&key.id) {
                    Some(job) if job.status == JobStatus::Pending => {
                        job.start();
                        break QueueEvent::Started { job: job.clone() };
                    }
                    // Stale entry: job was cancelled or removed while pending.
                    _ => continue,
                }
            }
        };
        let job = match &event {
            QueueEvent::Started { job } => job.clone(),
            _ => unreachable!(),
        };
        debug!(job_id = %job.id, priority = job.priority, "Job taken for processing");
        self.notify(&event);
        Some(job)
    }

    /// Get a snapshot of one job.
    pub fn get(&self, id: &JobId) -> Option<SlideshowJob> {
        self.inner.lock().unwrap().jobs.get(id).cloned()
    }

    /// Get snapshots of all tracked jobs, oldest submission first.
    pub fn list_all(&self) -> Vec<SlideshowJob> {
        let mut jobs: Vec<SlideshowJob> =
            self.inner.lock().unwrap().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Get snapshots of jobs in a given status, oldest first.
    pub fn list_by_status(&self, status: JobStatus) -> Vec<SlideshowJob> {
        let mut jobs: Vec<SlideshowJob> = self
            .inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Current status of one job, without cloning the whole record.
    pub fn status_of(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.lock().unwrap().jobs.get(id).map(|j| j.status)
    }

    /// Move a job to a terminal status.
    ///
    /// Returns `false` for unknown ids, terminal jobs (they are
    /// immutable) and non-terminal target statuses. An already-set
    /// `Cancelled` is never overwritten.
    pub fn update_status(&self, id: &JobId, status: JobStatus, error: Option<&str>) -> bool {
        if !status.is_terminal() {
            warn!(job_id = %id, status = %status, "update_status only accepts terminal statuses");
            return false;
        }
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return false;
            };
            if job.is_terminal() {
                return false;
            }
            match status {
                JobStatus::Completed => {
                    if let Some(error) = error {
                        job.error_message = Some(error.to_string());
                    }
                    job.complete();
                }
                JobStatus::Failed => job.fail(error.unwrap_or("job failed")),
                JobStatus::Cancelled => job.cancel(),
                _ => unreachable!(),
            }
            match status {
                JobStatus::Completed => inner.total_completed += 1,
                JobStatus::Failed => inner.total_failed += 1,
                _ => {}
            }
            QueueEvent::StatusChanged {
                id: id.clone(),
                status,
                error: error.map(str::to_string),
            }
        };
        debug!(job_id = %id, status = %status, "Job status updated");
        self.notify(&event);
        true
    }

    /// Update the in-flight video's progress.
    ///
    /// Returns `false` for unknown or terminal jobs.
    pub fn update_progress(&self, id: &JobId, progress: f32, label: Option<&str>) -> bool {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return false;
            };
            if job.is_terminal() {
                return false;
            }
            job.current_video_progress = progress.clamp(0.0, 100.0);
            if let Some(label) = label {
                job.current_step = Some(label.to_string());
            }
            QueueEvent::Progress {
                id: id.clone(),
                current_video_progress: job.current_video_progress,
                overall_progress: job.overall_progress(),
                step: job.current_step.clone(),
            }
        };
        self.notify(&event);
        true
    }

    /// Record one finished output video for a job.
    ///
    /// Resets the in-flight progress. Returns `false` for unknown or
    /// terminal jobs.
    pub fn record_video_completed(&self, id: &JobId, output: ArtifactRef) -> bool {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return false;
            };
            if job.is_terminal() {
                return false;
            }
            job.record_video_completed(output.clone());
            QueueEvent::VideoCompleted {
                id: id.clone(),
                output,
                videos_completed: job.videos_completed,
            }
        };
        self.notify(&event);
        true
    }

    /// Cancel a pending or processing job.
    ///
    /// Cancellation is cooperative: a processing job keeps its worker
    /// slot until the executor observes the status at its next
    /// checkpoint. Returns `false` for unknown or terminal jobs.
    pub fn cancel(&self, id: &JobId) -> bool {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return false;
            };
            if job.is_terminal() {
                return false;
            }
            job.cancel();
            QueueEvent::StatusChanged {
                id: id.clone(),
                status: JobStatus::Cancelled,
                error: None,
            }
        };
        debug!(job_id = %id, "Job cancelled");
        self.notify(&event);
        true
    }

    /// Cancel every pending and processing job. Returns how many were
    /// cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<JobId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .jobs
                .values()
                .filter(|j| !j.is_terminal())
                .map(|j| j.id.clone())
                .collect()
        };
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Remove a job from the registry.
    ///
    /// Processing jobs are never removed. Returns `false` if the job
    /// is unknown or still processing.
    pub fn remove(&self, id: &JobId) -> bool {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            match inner.jobs.get(id) {
                None => return false,
                Some(job) if job.status == JobStatus::Processing => return false,
                Some(_) => {}
            }
            inner.jobs.remove(id);
            QueueEvent::Removed { id: id.clone() }
        };
        self.notify(&event);
        true
    }

    /// Remove every terminal job. Returns how many were removed.
    pub fn clear_terminal(&self) -> usize {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.jobs.len();
            inner.jobs.retain(|_, job| !job.is_terminal());
            let removed = before - inner.jobs.len();
            if removed == 0 {
                return 0;
            }
            QueueEvent::Cleared { removed }
        };
        let removed = match event {
            QueueEvent::Cleared { removed } => removed,
            _ => unreachable!(),
        };
        debug!(removed, "Cleared terminal jobs");
        self.notify(&event);
        removed
    }

    /// Current queue counters.
    pub fn statistics(&self) -> QueueStatistics {
        let inner = self.inner.lock().unwrap();
        let mut by_status: HashMap<JobStatus, usize> = HashMap::new();
        for job in inner.jobs.values() {
            *by_status.entry(job.status).or_insert(0) += 1;
        }
        QueueStatistics {
            total: inner.jobs.len(),
            pending_count: by_status.get(&JobStatus::Pending).copied().unwrap_or(0),
            by_status,
            total_added: inner.total_added,
            total_completed: inner.total_completed,
            total_failed: inner.total_failed,
        }
    }

    /// Register a listener for every queue mutation.
    pub fn subscribe(&self, listener: std::sync::Arc<dyn QueueListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, AtomicOrdering::Relaxed));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Structural dump of every tracked job.
    pub fn export_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            jobs: self.list_all(),
        }
    }

    /// Reload jobs from a snapshot.
    ///
    /// Pending jobs re-enter the live priority structure in their
    /// original submission order; terminal jobs are kept as history.
    /// Jobs snapshotted mid-processing have no worker anymore and are
    /// demoted back to `Pending`. Jobs whose id is already tracked are
    /// skipped.
    pub fn restore_snapshot(&self, snapshot: QueueSnapshot) -> usize {
        let mut jobs = snapshot.jobs;
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut restored = 0;
        {
            let mut inner = self.inner.lock().unwrap();
            for mut job in jobs {
                if inner.jobs.contains_key(&job.id) {
                    warn!(job_id = %job.id, "Skipping snapshot job with duplicate id");
                    continue;
                }
                if job.status == JobStatus::Processing {
                    warn!(job_id = %job.id, "Demoting orphaned processing job to pending");
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                }
                if job.status == JobStatus::Pending {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.pending.push(PendingKey {
                        priority: job.priority,
                        seq,
                        id: job.id.clone(),
                    });
                }
                inner.total_added += 1;
                inner.jobs.insert(job.id.clone(), job);
                restored += 1;
            }
        }
        debug!(restored, "Restored queue snapshot");
        restored
    }

    /// Deliver an event to all listeners, outside the state lock.
    fn notify(&self, event: &QueueEvent) {
        let listeners: Vec<std::sync::Arc<dyn QueueListener>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    fn job_with_priority(priority: i32) -> SlideshowJob {
        SlideshowJob::new("/pool", 1).with_priority(priority)
    }

    #[test]
    fn take_next_prefers_higher_priority() {
        let queue = JobQueue::new();
        let low = job_with_priority(1);
        let high = job_with_priority(9);
        let low_id = low.id.clone();
        let high_id = high.id.clone();

        queue.submit(low);
        queue.submit(high);

        assert_eq!(queue.take_next().unwrap().id, high_id);
        assert_eq!(queue.take_next().unwrap().id, low_id);
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn equal_priority_is_fifo() {
        let queue = JobQueue::new();
        // Priorities [5, 1, 5]: expect first 5, second 5, then the 1.
        let a = job_with_priority(5);
        let b = job_with_priority(1);
        let c = job_with_priority(5);
        let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());

        queue.submit(a);
        queue.submit(b);
        queue.submit(c);

        assert_eq!(queue.take_next().unwrap().id, a_id);
        assert_eq!(queue.take_next().unwrap().id, c_id);
        assert_eq!(queue.take_next().unwrap().id, b_id);
    }

    #[test]
    fn take_next_marks_processing() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);

        let taken = queue.take_next().unwrap();
        assert_eq!(taken.status, JobStatus::Processing);
        assert!(taken.started_at.is_some());
        assert_eq!(queue.status_of(&id), Some(JobStatus::Processing));
    }

    #[test]
    #[should_panic(expected = "duplicate job id")]
    fn duplicate_submit_panics() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        queue.submit(job.clone());
        queue.submit(job);
    }

    #[test]
    fn cancel_pending_job_skips_it_at_dispatch() {
        let queue = JobQueue::new();
        let a = job_with_priority(5);
        let b = job_with_priority(1);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        queue.submit(a);
        queue.submit(b);

        assert!(queue.cancel(&a_id));
        assert_eq!(queue.status_of(&a_id), Some(JobStatus::Cancelled));

        // The stale heap entry for the cancelled job is skipped.
        assert_eq!(queue.take_next().unwrap().id, b_id);
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn cancel_terminal_job_is_noop() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();
        assert!(queue.update_status(&id, JobStatus::Completed, None));

        assert!(!queue.cancel(&id));
        assert_eq!(queue.status_of(&id), Some(JobStatus::Completed));
    }

    #[test]
    fn cancelled_is_not_overwritten_by_failed() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();

        assert!(queue.cancel(&id));
        assert!(!queue.update_status(&id, JobStatus::Failed, Some("boom")));
        assert_eq!(queue.status_of(&id), Some(JobStatus::Cancelled));
    }

    #[test]
    fn update_status_unknown_id_returns_false() {
        let queue = JobQueue::new();
        assert!(!queue.update_status(&JobId::new(), JobStatus::Completed, None));
        assert!(!queue.update_progress(&JobId::new(), 50.0, None));
        assert!(!queue.record_video_completed(&JobId::new(), ArtifactRef::new("x")));
    }

    #[test]
    fn remove_never_touches_processing_jobs() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();

        assert!(!queue.remove(&id));
        assert!(queue.get(&id).is_some());

        queue.update_status(&id, JobStatus::Completed, None);
        assert!(queue.remove(&id));
        assert!(queue.get(&id).is_none());
    }

    #[test]
    fn clear_terminal_keeps_live_jobs() {
        let queue = JobQueue::new();
        let done = job_with_priority(0);
        let live = job_with_priority(0);
        let done_id = done.id.clone();
        let live_id = live.id.clone();
        queue.submit(done);
        queue.submit(live);
        queue.take_next().unwrap();
        queue.update_status(&done_id, JobStatus::Completed, None);

        assert_eq!(queue.clear_terminal(), 1);
        assert!(queue.get(&done_id).is_none());
        assert!(queue.get(&live_id).is_some());
    }

    #[test]
    fn statistics_track_totals() {
        let queue = JobQueue::new();
        let a = job_with_priority(0);
        let b = job_with_priority(0);
        let a_id = a.id.clone();
        queue.submit(a);
        queue.submit(b);
        queue.take_next().unwrap();
        queue.update_status(&a_id, JobStatus::Failed, Some("render failed"));

        let stats = queue.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.total_added, 2);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.by_status.get(&JobStatus::Failed), Some(&1));
    }

    #[test]
    fn record_video_completed_updates_progress() {
        let queue = JobQueue::new();
        let job = SlideshowJob::new("/pool", 2);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();

        queue.update_progress(&id, 50.0, Some("compositing"));
        assert!(queue.record_video_completed(&id, ArtifactRef::new("out0.mp4")));

        let job = queue.get(&id).unwrap();
        assert_eq!(job.videos_completed, 1);
        assert_eq!(job.current_video_progress, 0.0);
        assert_eq!(job.generated_outputs.len(), 1);
        assert!((job.overall_progress() - 50.0).abs() < 0.01);
    }

    struct Recorder {
        events: StdMutex<Vec<String>>,
    }

    impl QueueListener for Recorder {
        fn on_event(&self, event: &QueueEvent) {
            let tag = match event {
                QueueEvent::Added { .. } => "added",
                QueueEvent::Started { .. } => "started",
                QueueEvent::Progress { .. } => "progress",
                QueueEvent::VideoCompleted { .. } => "video_completed",
                QueueEvent::StatusChanged { .. } => "status_changed",
                QueueEvent::Removed { .. } => "removed",
                QueueEvent::Cleared { .. } => "cleared",
            };
            self.events.lock().unwrap().push(tag.to_string());
        }
    }

    #[test]
    fn listeners_observe_lifecycle_events() {
        let queue = JobQueue::new();
        let recorder = Arc::new(Recorder {
            events: StdMutex::new(Vec::new()),
        });
        let listener_id = queue.subscribe(recorder.clone());

        let job = SlideshowJob::new("/pool", 1);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();
        queue.update_progress(&id, 30.0, None);
        queue.update_status(&id, JobStatus::Completed, None);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, ["added", "started", "progress", "status_changed"]);

        assert!(queue.unsubscribe(listener_id));
        assert!(!queue.unsubscribe(listener_id));
    }

    /// A listener that re-enters the queue must not deadlock.
    struct Reentrant {
        queue: Arc<JobQueue>,
    }

    impl QueueListener for Reentrant {
        fn on_event(&self, _event: &QueueEvent) {
            let _ = self.queue.statistics();
            let _ = self.queue.list_all();
        }
    }

    #[test]
    fn reentrant_listener_does_not_deadlock() {
        let queue = Arc::new(JobQueue::new());
        queue.subscribe(Arc::new(Reentrant {
            queue: queue.clone(),
        }));

        queue.submit(SlideshowJob::new("/pool", 1));
        assert!(queue.take_next().is_some());
    }

    #[test]
    fn snapshot_roundtrip_restores_pending_order() {
        let queue = JobQueue::new();
        let a = job_with_priority(5);
        let b = job_with_priority(1);
        let c = job_with_priority(5);
        let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());
        queue.submit(a);
        queue.submit(b);
        queue.submit(c);

        let snapshot = queue.export_snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
        let decoded: QueueSnapshot = serde_json::from_str(&json).expect("deserialize snapshot");

        let restored = JobQueue::new();
        assert_eq!(restored.restore_snapshot(decoded), 3);

        assert_eq!(restored.take_next().unwrap().id, a_id);
        assert_eq!(restored.take_next().unwrap().id, c_id);
        assert_eq!(restored.take_next().unwrap().id, b_id);
    }

    #[test]
    fn snapshot_restore_demotes_orphaned_processing_jobs() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();

        let snapshot = queue.export_snapshot();
        let restored = JobQueue::new();
        restored.restore_snapshot(snapshot);

        assert_eq!(restored.status_of(&id), Some(JobStatus::Pending));
        assert_eq!(restored.take_next().unwrap().id, id);
    }

    #[test]
    fn snapshot_keeps_terminal_jobs_as_history() {
        let queue = JobQueue::new();
        let job = job_with_priority(0);
        let id = job.id.clone();
        queue.submit(job);
        queue.take_next().unwrap();
        queue.update_status(&id, JobStatus::Completed, None);

        let restored = JobQueue::new();
        restored.restore_snapshot(queue.export_snapshot());

        assert_eq!(restored.status_of(&id), Some(JobStatus::Completed));
        assert!(restored.take_next().is_none());
    }
}
