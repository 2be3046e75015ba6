//! Bounded in-memory cache of decoded images.
//!
//! Decoding the same source image for every video in a batch is the
//! dominant cost of slideshow generation, so decoded frames are shared
//! across concurrent jobs through this cache. Entries are evicted in
//! strict least-recently-used order whenever either the item-count or
//! the estimated-byte budget is exceeded, and lazily when they outlive
//! the configured time-to-live.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::{ColorType, DynamicImage, GenericImageView};
use metrics::{counter, gauge};
use slidecast_models::{ColorFormat, ImageRef};
use tracing::{debug, trace};

/// Fixed per-entry overhead added to the pixel-buffer estimate, bytes.
const ENTRY_OVERHEAD_BYTES: u64 = 256;

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub used_bytes: u64,
}

impl CacheStats {
    /// Hit ratio in 0.0..=1.0; zero when nothing was looked up yet.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    image: Arc<DynamicImage>,
    size_bytes: u64,
    inserted_at: Instant,
    last_used_tick: u64,
}

struct CacheInner {
    entries: HashMap<ImageRef, CacheEntry>,
    used_bytes: u64,
    // Monotonic access counter; larger tick = more recently used.
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Shared LRU cache of decoded images keyed by source path.
///
/// All returned images are behind `Arc`, so a hit costs one pointer
/// clone and concurrent jobs never duplicate pixel buffers.
pub struct ImageCache {
    inner: Mutex<CacheInner>,
    max_items: usize,
    max_bytes: u64,
    ttl: Duration,
}

impl ImageCache {
    /// Create a cache bounded by `max_items` entries and `max_bytes`
    /// of estimated decoded size. Entries older than `ttl` are dropped
    /// on next access.
    pub fn new(max_items: usize, max_bytes: u64, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                used_bytes: 0,
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_items: max_items.max(1),
            max_bytes,
            ttl,
        }
    }

    /// Look up a decoded image, refreshing its recency on a hit.
    ///
    /// An entry past its time-to-live is removed and reported as a
    /// miss, so callers re-decode and re-populate naturally.
    pub fn get(&self, key: &ImageRef) -> Option<Arc<DynamicImage>> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => {
                inner.misses += 1;
                counter!("slidecast_cache_misses_total").increment(1);
                return None;
            }
        };

        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.used_bytes = inner.used_bytes.saturating_sub(entry.size_bytes);
                inner.evictions += 1;
                trace!(key = %key, "Cache entry expired");
            }
            inner.misses += 1;
            counter!("slidecast_cache_misses_total").increment(1);
            return None;
        }

        let entry = inner
            .entries
            .get_mut(key)
            .map(|entry| {
                entry.last_used_tick = tick;
                Arc::clone(&entry.image)
            });
        inner.hits += 1;
        counter!("slidecast_cache_hits_total").increment(1);
        entry
    }

    /// Insert a decoded image, evicting least-recently-used entries
    /// until both budgets hold. Returns whether the image was
    /// accepted.
    ///
    /// An image whose estimated size alone exceeds the byte budget is
    /// refused rather than allowed to flush the whole cache.
    pub fn put(&self, key: ImageRef, image: Arc<DynamicImage>) -> bool {
        let size_bytes = estimate_decoded_size(&image);
        if size_bytes > self.max_bytes {
            debug!(
                key = %key,
                size_bytes,
                max_bytes = self.max_bytes,
                "Image larger than cache budget, not caching"
            );
            return false;
        }

        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        // Replacing an existing entry releases its old accounting first.
        if let Some(old) = inner.entries.remove(&key) {
            inner.used_bytes = inner.used_bytes.saturating_sub(old.size_bytes);
        }

        while inner.entries.len() >= self.max_items
            || inner.used_bytes + size_bytes > self.max_bytes
        {
            if !evict_lru(&mut inner) {
                break;
            }
        }

        inner.used_bytes += size_bytes;
        inner.entries.insert(
            key,
            CacheEntry {
                image,
                size_bytes,
                inserted_at: Instant::now(),
                last_used_tick: tick,
            },
        );
        gauge!("slidecast_cache_used_bytes").set(inner.used_bytes as f64);
        gauge!("slidecast_cache_entries").set(inner.entries.len() as f64);
        true
    }

    /// Drop every entry. Outstanding `Arc` handles stay valid.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.used_bytes = 0;
        debug!(removed, "Image cache cleared");
        gauge!("slidecast_cache_used_bytes").set(0.0);
        gauge!("slidecast_cache_entries").set(0.0);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.entries.len(),
            used_bytes: inner.used_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Remove the least-recently-used entry. Returns false when empty.
fn evict_lru(inner: &mut CacheInner) -> bool {
    let victim = inner
        .entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_used_tick)
        .map(|(key, _)| key.clone());
    match victim {
        Some(key) => {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.used_bytes = inner.used_bytes.saturating_sub(entry.size_bytes);
                inner.evictions += 1;
                counter!("slidecast_cache_evictions_total").increment(1);
                trace!(key = %key, "Evicted least-recently-used cache entry");
            }
            true
        }
        None => false,
    }
}

/// Estimated in-memory size of a decoded image:
/// `width * height * channels * bytes_per_channel` plus a small fixed
/// overhead for the entry bookkeeping.
pub fn estimate_decoded_size(image: &DynamicImage) -> u64 {
    let (width, height) = image.dimensions();
    let format = color_format_of(image.color());
    let pixel_bytes = format.channel_count() as u64 * format.bytes_per_channel() as u64;
    width as u64 * height as u64 * pixel_bytes + ENTRY_OVERHEAD_BYTES
}

/// Map the decoder's color type onto the engine's format descriptor.
pub fn color_format_of(color: ColorType) -> ColorFormat {
    match color {
        ColorType::L8 | ColorType::La8 => ColorFormat::Gray,
        ColorType::L16 | ColorType::La16 => ColorFormat::Gray16,
        ColorType::Rgb8 => ColorFormat::Rgb,
        ColorType::Rgb16 => ColorFormat::Rgb16,
        ColorType::Rgba8 => ColorFormat::Rgba,
        ColorType::Rgba16 => ColorFormat::Rgba16,
        _ => ColorFormat::Unknown,
    }
}
