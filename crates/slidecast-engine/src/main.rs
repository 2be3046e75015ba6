//! Slidecast worker binary.
//!
//! Wires the queue, cache, resource monitor, executor and worker pool
//! together, optionally submits a batch for `SLIDECAST_IMAGE_DIR`, and
//! runs until the queue drains or the process is interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slidecast_engine::{
    BatchProcessor, DirectoryImageProvider, EngineConfig, FfmpegRenderer, ImageCache,
    JobExecutor, ResourceMonitor, UniformDurations,
};
use slidecast_models::SlideshowJob;
use slidecast_queue::JobQueue;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env();
    info!(
        max_workers = config.max_workers,
        output_dir = %config.output_dir.display(),
        "Starting slidecast worker"
    );

    let queue = Arc::new(JobQueue::new());
    let monitor = Arc::new(ResourceMonitor::new(
        config.per_worker_memory_bytes,
        config.worker_ceiling,
    ));
    let cache = Arc::new(ImageCache::new(
        config.cache_max_items,
        config.cache_max_bytes,
        config.cache_ttl,
    ));
    let executor = Arc::new(JobExecutor::new(
        queue.clone(),
        cache.clone(),
        Arc::new(DirectoryImageProvider::new()),
        Arc::new(FfmpegRenderer::new()),
        Arc::new(UniformDurations::from_config(&config)),
        config.output_dir.clone(),
    ));
    let processor = BatchProcessor::new(queue.clone(), executor, monitor.clone(), &config);

    let snapshot = monitor.snapshot();
    info!(
        logical_cores = snapshot.logical_cores,
        memory_percent = snapshot.memory_percent,
        recommended_workers = monitor.recommended_worker_count(),
        "System resources"
    );

    processor.start();

    let submitted = match std::env::var("SLIDECAST_IMAGE_DIR") {
        Ok(image_dir) => {
            let videos: u32 = std::env::var("SLIDECAST_VIDEOS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let job = SlideshowJob::new(image_dir, videos);
            info!(job_id = %job.id, videos, "Submitting batch from environment");
            processor.submit(job);
            true
        }
        Err(_) => false,
    };

    if submitted {
        // One-shot mode: exit when the batch finishes.
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
            }
            _ = wait_for_drain(&queue, &processor) => {
                info!("Queue drained, shutting down");
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, shutting down");
    }

    processor.stop(true).await;
    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_ratio = stats.hit_ratio(),
        "Image cache totals"
    );
    Ok(())
}

/// Resolves once no job is pending or in flight.
async fn wait_for_drain(queue: &JobQueue, processor: &BatchProcessor) {
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = queue.statistics();
        let live = stats.total
            - stats
                .by_status
                .iter()
                .filter(|(status, _)| status.is_terminal())
                .map(|(_, count)| count)
                .sum::<usize>();
        if live == 0 && processor.active_workers() == 0 {
            return;
        }
    }
}
