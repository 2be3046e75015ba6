//! System resource sampling for admission decisions and pool sizing.
//!
//! Everything here is advisory. The monitor never fails: when the
//! platform cannot supply a figure it substitutes conservative
//! defaults and carries on.

use std::sync::Mutex;

use sysinfo::System;
use tracing::debug;

/// Fallback core count when detection fails.
const FALLBACK_CORES: usize = 4;

/// Fallback total memory when detection fails (4 GB).
const FALLBACK_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Point-in-time view of system resources. Always advisory.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSnapshot {
    /// Memory in use, bytes
    pub memory_used: u64,
    /// Memory available for new allocations, bytes
    pub memory_available: u64,
    /// Total installed memory, bytes
    pub memory_total: u64,
    /// Memory usage, 0-100
    pub memory_percent: f32,
    /// Global CPU usage, 0-100
    pub cpu_percent: f32,
    /// Logical core count
    pub logical_cores: usize,
    /// Physical core count; equal to the logical count when the
    /// platform cannot tell them apart
    pub physical_cores: usize,
}

impl ResourceSnapshot {
    /// Conservative defaults used when platform introspection fails:
    /// 4 cores, 4 GB total with half assumed free.
    fn fallback() -> Self {
        Self {
            memory_used: FALLBACK_MEMORY_BYTES / 2,
            memory_available: FALLBACK_MEMORY_BYTES / 2,
            memory_total: FALLBACK_MEMORY_BYTES,
            memory_percent: 50.0,
            cpu_percent: 0.0,
            logical_cores: FALLBACK_CORES,
            physical_cores: FALLBACK_CORES,
        }
    }
}

/// Samples memory and CPU and recommends a worker-pool size.
///
/// Used for admission checks, never enforcement: a negative
/// `check_admission` answer may be ignored by the caller.
pub struct ResourceMonitor {
    system: Mutex<System>,
    per_worker_memory_bytes: u64,
    worker_ceiling: usize,
}

impl ResourceMonitor {
    /// Create a monitor.
    ///
    /// `per_worker_memory_bytes` is the estimated footprint of one
    /// generation worker; `worker_ceiling` caps the recommendation.
    pub fn new(per_worker_memory_bytes: u64, worker_ceiling: usize) -> Self {
        Self {
            system: Mutex::new(System::new()),
            per_worker_memory_bytes: per_worker_memory_bytes.max(1),
            worker_ceiling: worker_ceiling.max(1),
        }
    }

    /// Best-effort resource snapshot. Never fails.
    pub fn snapshot(&self) -> ResourceSnapshot {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();
        system.refresh_cpu_usage();

        let memory_total = system.total_memory();
        if memory_total == 0 {
            debug!("Memory detection unavailable, using fallback snapshot");
            return ResourceSnapshot::fallback();
        }

        let memory_used = system.used_memory();
        let memory_available = system.available_memory();
        ResourceSnapshot {
            memory_used,
            memory_available,
            memory_total,
            memory_percent: (memory_used as f32 / memory_total as f32) * 100.0,
            cpu_percent: system.global_cpu_usage(),
            logical_cores: detect_logical_cores(),
            physical_cores: system
                .physical_core_count()
                .unwrap_or_else(detect_logical_cores),
        }
    }

    /// Advisory admission gate.
    ///
    /// Returns `(true, reason)` when both memory and CPU are under the
    /// supplied thresholds. Callers may choose to wait on a negative
    /// answer; nothing here blocks a submission.
    pub fn check_admission(&self, max_memory_pct: f32, max_cpu_pct: f32) -> (bool, String) {
        let snapshot = self.snapshot();
        if snapshot.memory_percent > max_memory_pct {
            return (
                false,
                format!(
                    "memory usage {:.1}% exceeds threshold {:.1}%",
                    snapshot.memory_percent, max_memory_pct
                ),
            );
        }
        if snapshot.cpu_percent > max_cpu_pct {
            return (
                false,
                format!(
                    "cpu usage {:.1}% exceeds threshold {:.1}%",
                    snapshot.cpu_percent, max_cpu_pct
                ),
            );
        }
        (true, "resources within thresholds".to_string())
    }

    /// Recommended worker-pool size:
    /// `min(physical cores, available_memory / per_worker_estimate)`,
    /// floor 1, capped at the configured ceiling. Rendering is
    /// compute-bound, so hyperthreads do not count toward it.
    ///
    /// This is a suggestion for (re)configuring the pool, never
    /// auto-applied.
    pub fn recommended_worker_count(&self) -> usize {
        let snapshot = self.snapshot();
        let by_memory = (snapshot.memory_available / self.per_worker_memory_bytes) as usize;
        snapshot
            .physical_cores
            .min(by_memory)
            .clamp(1, self.worker_ceiling)
    }
}

/// Logical core count, falling back to 4 when detection fails.
fn detect_logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(FALLBACK_CORES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_never_reports_zero_cores() {
        let monitor = ResourceMonitor::new(1024 * 1024 * 1024, 8);
        let snapshot = monitor.snapshot();
        assert!(snapshot.logical_cores >= 1);
        assert!(snapshot.physical_cores >= 1);
        assert!(snapshot.physical_cores <= snapshot.logical_cores);
        assert!(snapshot.memory_total > 0);
    }

    #[test]
    fn recommendation_respects_floor_and_ceiling() {
        // A huge per-worker estimate forces the memory term to zero;
        // the floor of one worker must still hold.
        let monitor = ResourceMonitor::new(u64::MAX, 8);
        assert_eq!(monitor.recommended_worker_count(), 1);

        // A tiny estimate can never exceed the ceiling.
        let monitor = ResourceMonitor::new(1, 3);
        assert!(monitor.recommended_worker_count() <= 3);
    }

    #[test]
    fn admission_with_generous_thresholds_passes() {
        let monitor = ResourceMonitor::new(1024 * 1024 * 1024, 8);
        let (ok, _reason) = monitor.check_admission(100.0, 100.0);
        assert!(ok);
    }

    #[test]
    fn admission_with_impossible_thresholds_fails_with_reason() {
        let monitor = ResourceMonitor::new(1024 * 1024 * 1024, 8);
        let (ok, reason) = monitor.check_admission(-1.0, -1.0);
        assert!(!ok);
        assert!(!reason.is_empty());
    }

    #[test]
    fn fallback_snapshot_is_conservative() {
        let snapshot = ResourceSnapshot::fallback();
        assert_eq!(snapshot.logical_cores, 4);
        assert_eq!(snapshot.physical_cores, 4);
        assert_eq!(snapshot.memory_total, 4 * 1024 * 1024 * 1024);
        assert!(snapshot.memory_available <= snapshot.memory_total);
    }
}
