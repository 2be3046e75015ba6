//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
///
/// All values are plain data supplied at construction time; the engine
/// itself never reads or persists configuration files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent generation jobs
    pub max_workers: usize,
    /// Whether submitting a job to a running pool dispatches immediately
    pub auto_dispatch: bool,
    /// Image cache budget, item count
    pub cache_max_items: usize,
    /// Image cache budget, estimated bytes
    pub cache_max_bytes: u64,
    /// Image cache entry time-to-live
    pub cache_ttl: Duration,
    /// Sampled total video length range, seconds
    pub video_length_secs: (f64, f64),
    /// Sampled per-slide display length range, seconds
    pub slide_length_secs: (f64, f64),
    /// Floor for the per-slide length after sampling
    pub min_slide_length_secs: f64,
    /// Advisory admission gate: maximum memory usage percent
    pub max_memory_pct: f32,
    /// Advisory admission gate: maximum CPU usage percent
    pub max_cpu_pct: f32,
    /// Estimated memory footprint of one worker, for pool sizing
    pub per_worker_memory_bytes: u64,
    /// Ceiling for the recommended worker count
    pub worker_ceiling: usize,
    /// A processing job older than this is flagged by `health_check`
    pub stuck_job_threshold: Duration,
    /// Directory for rendered output videos
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            auto_dispatch: true,
            cache_max_items: 128,
            cache_max_bytes: 512 * 1024 * 1024, // 512 MB
            cache_ttl: Duration::from_secs(300),
            video_length_secs: (30.0, 90.0),
            slide_length_secs: (2.0, 5.0),
            min_slide_length_secs: 0.1,
            max_memory_pct: 85.0,
            max_cpu_pct: 90.0,
            per_worker_memory_bytes: 1024 * 1024 * 1024, // 1 GB
            worker_ceiling: 8,
            stuck_job_threshold: Duration::from_secs(600), // 10 minutes
            output_dir: PathBuf::from("/tmp/slidecast"),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to the
    /// defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_parse("SLIDECAST_MAX_WORKERS", defaults.max_workers),
            auto_dispatch: env_parse("SLIDECAST_AUTO_DISPATCH", defaults.auto_dispatch),
            cache_max_items: env_parse("SLIDECAST_CACHE_MAX_ITEMS", defaults.cache_max_items),
            cache_max_bytes: env_parse("SLIDECAST_CACHE_MAX_BYTES", defaults.cache_max_bytes),
            cache_ttl: Duration::from_secs(env_parse(
                "SLIDECAST_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            video_length_secs: (
                env_parse("SLIDECAST_VIDEO_LENGTH_MIN", defaults.video_length_secs.0),
                env_parse("SLIDECAST_VIDEO_LENGTH_MAX", defaults.video_length_secs.1),
            ),
            slide_length_secs: (
                env_parse("SLIDECAST_SLIDE_LENGTH_MIN", defaults.slide_length_secs.0),
                env_parse("SLIDECAST_SLIDE_LENGTH_MAX", defaults.slide_length_secs.1),
            ),
            min_slide_length_secs: defaults.min_slide_length_secs,
            max_memory_pct: env_parse("SLIDECAST_MAX_MEMORY_PCT", defaults.max_memory_pct),
            max_cpu_pct: env_parse("SLIDECAST_MAX_CPU_PCT", defaults.max_cpu_pct),
            per_worker_memory_bytes: env_parse(
                "SLIDECAST_PER_WORKER_MEMORY_BYTES",
                defaults.per_worker_memory_bytes,
            ),
            worker_ceiling: env_parse("SLIDECAST_WORKER_CEILING", defaults.worker_ceiling),
            stuck_job_threshold: Duration::from_secs(env_parse(
                "SLIDECAST_STUCK_JOB_THRESHOLD_SECS",
                defaults.stuck_job_threshold.as_secs(),
            )),
            output_dir: std::env::var("SLIDECAST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.max_workers >= 1);
        assert!(config.min_slide_length_secs > 0.0);
        assert!(config.slide_length_secs.0 <= config.slide_length_secs.1);
        assert!(config.video_length_secs.0 <= config.video_length_secs.1);
        assert!(config.worker_ceiling >= config.max_workers);
    }
}
