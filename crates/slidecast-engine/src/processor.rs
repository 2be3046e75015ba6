//! Resizable worker pool driving jobs from the queue through the
//! executor.
//!
//! Capacity is enforced with an atomic slot counter: a worker slot is
//! reserved before a job is taken from the queue, so the number of
//! in-flight jobs can never exceed the configured maximum, and a
//! failed reservation never leaves a job stranded in `Processing`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, gauge};
use slidecast_models::{JobId, JobStatus, SlideshowJob};
use slidecast_queue::{JobQueue, QueueStatistics};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::executor::{ExecutionOutcome, JobExecutor};
use crate::resources::ResourceMonitor;

/// Lifecycle state of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Not dispatching; jobs accumulate as pending.
    Stopped,
    /// Dispatching up to `max_workers` jobs concurrently.
    Running,
    /// In-flight jobs continue, no new dispatch until resumed.
    Paused,
}

/// Point-in-time processor counters.
#[derive(Debug, Clone)]
pub struct ProcessorStatistics {
    pub state: PoolState,
    pub max_workers: usize,
    pub active_workers: usize,
    /// Output videos produced by completed jobs since construction.
    pub total_videos_generated: u64,
    pub queue: QueueStatistics,
}

/// Worker pool over the job queue.
pub struct BatchProcessor {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    monitor: Arc<ResourceMonitor>,
    state: Mutex<PoolState>,
    max_workers: AtomicUsize,
    active_count: AtomicUsize,
    videos_generated: AtomicU64,
    active: Mutex<HashMap<JobId, Instant>>,
    handles: Mutex<HashMap<JobId, JoinHandle<()>>>,
    auto_dispatch: bool,
    max_memory_pct: f32,
    max_cpu_pct: f32,
    stuck_job_threshold: Duration,
}

impl BatchProcessor {
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<JobExecutor>,
        monitor: Arc<ResourceMonitor>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            executor,
            monitor,
            state: Mutex::new(PoolState::Stopped),
            max_workers: AtomicUsize::new(config.max_workers.max(1)),
            active_count: AtomicUsize::new(0),
            videos_generated: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            auto_dispatch: config.auto_dispatch,
            max_memory_pct: config.max_memory_pct,
            max_cpu_pct: config.max_cpu_pct,
            stuck_job_threshold: config.stuck_job_threshold,
        })
    }

    /// Submit a job and, when the pool is running with auto-dispatch,
    /// immediately try to fill free worker slots.
    ///
    /// The resource check is advisory: a negative answer is logged and
    /// the job is accepted anyway.
    pub fn submit(self: &Arc<Self>, job: SlideshowJob) {
        let (admitted, reason) = self.monitor.check_admission(self.max_memory_pct, self.max_cpu_pct);
        if !admitted {
            warn!(job_id = %job.id, reason, "Submitting despite resource pressure");
        }
        self.queue.submit(job);
        if self.auto_dispatch {
            self.pump();
        }
    }

    /// Start dispatching pending jobs.
    pub fn start(self: &Arc<Self>) {
        *self.state.lock().unwrap() = PoolState::Running;
        info!(
            max_workers = self.max_workers.load(Ordering::Relaxed),
            "Processor started"
        );
        self.pump();
    }

    /// Stop the pool, cancelling every job that has not finished.
    ///
    /// Pending jobs are cancelled in place; in-flight jobs observe the
    /// cancellation at their executor's next checkpoint. When `wait`
    /// is set this call blocks until the dispatched tasks return.
    pub async fn stop(self: &Arc<Self>, wait: bool) {
        *self.state.lock().unwrap() = PoolState::Stopped;
        let cancelled = self.queue.cancel_all();
        info!(wait, cancelled, "Processor stopping");
        if !wait {
            return;
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut handles = self.handles.lock().unwrap();
            handles.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!(error = %err, "Worker task join failed");
                }
            }
        }
    }

    /// Stop dispatching without touching in-flight jobs.
    pub fn pause(&self) {
        *self.state.lock().unwrap() = PoolState::Paused;
        info!("Processor paused");
    }

    /// Resume dispatching after a pause.
    pub fn resume(self: &Arc<Self>) {
        *self.state.lock().unwrap() = PoolState::Running;
        info!("Processor resumed");
        self.pump();
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock().unwrap()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Cancel one job. Pending jobs never run; processing jobs stop
    /// at their executor's next checkpoint.
    pub fn cancel_job(&self, id: &JobId) -> bool {
        self.queue.cancel(id)
    }

    /// Cancel everything that has not finished yet. Returns how many
    /// jobs were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.queue.cancel_all()
    }

    /// Resize the pool. Raising the ceiling dispatches immediately;
    /// lowering it sheds workers by attrition, never by killing
    /// in-flight jobs.
    pub fn set_max_workers(self: &Arc<Self>, max_workers: usize) {
        let max_workers = max_workers.max(1);
        let previous = self.max_workers.swap(max_workers, Ordering::Relaxed);
        info!(previous, max_workers, "Worker ceiling changed");
        if max_workers > previous {
            self.pump();
        }
    }

    /// Apply the resource monitor's recommendation as the new ceiling.
    pub fn autosize(self: &Arc<Self>) -> usize {
        let recommended = self.monitor.recommended_worker_count();
        self.set_max_workers(recommended);
        recommended
    }

    pub fn total_videos_generated(&self) -> u64 {
        self.videos_generated.load(Ordering::Relaxed)
    }

    pub fn statistics(&self) -> ProcessorStatistics {
        ProcessorStatistics {
            state: self.state(),
            max_workers: self.max_workers(),
            active_workers: self.active_workers(),
            total_videos_generated: self.total_videos_generated(),
            queue: self.queue.statistics(),
        }
    }

    /// Advisory stall check: in-flight jobs older than the configured
    /// threshold, with how long they have been running. Flagged jobs
    /// are never killed; a slow render is indistinguishable from a
    /// wedged one from out here.
    pub fn health_check(&self) -> Vec<(JobId, Duration)> {
        let stuck: Vec<(JobId, Duration)> = self
            .active
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, started)| started.elapsed() > self.stuck_job_threshold)
            .map(|(id, started)| (id.clone(), started.elapsed()))
            .collect();
        for (id, elapsed) in &stuck {
            warn!(
                job_id = %id,
                elapsed_secs = elapsed.as_secs(),
                "Job exceeds stall threshold"
            );
        }
        stuck
    }

    /// Fill free worker slots with pending jobs until either runs out.
    fn pump(self: &Arc<Self>) {
        loop {
            if self.state() != PoolState::Running {
                return;
            }
            // Reserve a slot before touching the queue so a taken job
            // always has a worker.
            let reserved = self
                .active_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                    let max = self.max_workers.load(Ordering::Relaxed);
                    (active < max).then_some(active + 1)
                })
                .is_ok();
            if !reserved {
                return;
            }
            match self.queue.take_next() {
                Some(job) => self.dispatch(job),
                None => {
                    self.active_count.fetch_sub(1, Ordering::SeqCst);
                    // A submission may have raced this slot while it
                    // was still held and backed off; leaving now would
                    // strand that job next to a free worker.
                    if self.queue.statistics().pending_count == 0 {
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, job: SlideshowJob) {
        let id = job.id.clone();
        self.active
            .lock()
            .unwrap()
            .insert(id.clone(), Instant::now());
        gauge!("slidecast_active_workers").set(self.active_workers() as f64);

        let this = Arc::clone(self);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            // A panicking executor must not take the pool down or leak
            // the worker slot.
            let outcome = match AssertUnwindSafe(this.executor.run(job)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(job_id = %task_id, "Job task panicked");
                    ExecutionOutcome::Failed {
                        error: "internal error: job task panicked".to_string(),
                    }
                }
            };
            this.finish(&task_id, outcome);
        });

        let mut handles = self.handles.lock().unwrap();
        handles.retain(|_, handle| !handle.is_finished());
        handles.insert(id, handle);
    }

    /// Record a finished job and refill the freed slot.
    fn finish(self: &Arc<Self>, id: &JobId, outcome: ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Completed {
                videos_ok,
                error_log,
            } => {
                info!(job_id = %id, videos_ok, "Job completed");
                self.videos_generated
                    .fetch_add(videos_ok as u64, Ordering::Relaxed);
                counter!("slidecast_jobs_completed_total").increment(1);
                self.queue
                    .update_status(id, JobStatus::Completed, error_log.as_deref());
            }
            ExecutionOutcome::Failed { error } => {
                error!(job_id = %id, error, "Job failed");
                counter!("slidecast_jobs_failed_total").increment(1);
                self.queue.update_status(id, JobStatus::Failed, Some(&error));
            }
            ExecutionOutcome::Cancelled => {
                info!(job_id = %id, "Job cancelled");
                counter!("slidecast_jobs_cancelled_total").increment(1);
                // Usually already terminal; this only covers removal
                // races where the record still exists.
                self.queue.update_status(id, JobStatus::Cancelled, None);
            }
        }

        self.active.lock().unwrap().remove(id);
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        gauge!("slidecast_active_workers").set(self.active_workers() as f64);
        self.pump();
    }
}
