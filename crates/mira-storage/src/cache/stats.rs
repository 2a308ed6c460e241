//! Cache statistics for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

/// Monotonic counters describing cache activity.
///
/// Counters are incremented with relaxed atomics; individual values are
/// exact, but a [`snapshot`](CacheStats::snapshot) taken under
/// concurrent load is not a consistent cut across counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fetches served from a tier.
    hits: AtomicU64,
    /// Fetches that had to read the heap file.
    misses: AtomicU64,
    /// Pages admitted into a tier.
    inserts: AtomicU64,
    /// Pages removed from the cache.
    evictions: AtomicU64,
    /// Cold-to-hot moves.
    promotes: AtomicU64,
    /// Hot-to-cold moves.
    demotes: AtomicU64,
    /// Dirty pages written back.
    flushes: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cache hit.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an admission.
    #[inline]
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a promotion.
    #[inline]
    pub fn record_promote(&self) {
        self.promotes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a demotion.
    #[inline]
    pub fn record_demote(&self) {
        self.demotes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a writeback.
    #[inline]
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotes: self.promotes.load(Ordering::Relaxed),
            demotes: self.demotes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.promotes.store(0, Ordering::Relaxed);
        self.demotes.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
    }

    /// Emits the counters as human-readable log lines.
    pub fn log(&self) {
        let snap = self.snapshot();
        info!("cache statistics:");
        info!("  hits: {}", snap.hits);
        info!("  misses: {}", snap.misses);
        info!("  hit ratio: {:.2}%", snap.hit_ratio() * 100.0);
        info!("  inserts: {}", snap.inserts);
        info!("  evictions: {}", snap.evictions);
        info!("  promotions: {}", snap.promotes);
        info!("  demotions: {}", snap.demotes);
        info!("  flushes: {}", snap.flushes);
    }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)] // Field names mirror the counters above
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub promotes: u64,
    pub demotes: u64,
    pub flushes: u64,
}

impl CacheStatsSnapshot {
    /// Returns the hit ratio in `[0, 1]`, or 0 when no fetch happened.
    pub fn hit_ratio(&self) -> f64 {
        let fetches = self.hits + self.misses;
        if fetches == 0 {
            0.0
        } else {
            self.hits as f64 / fetches as f64
        }
    }
}

impl std::fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, hit ratio: {:.2}%, inserts: {}, evictions: {}, promotions: {}, demotions: {}, flushes: {}",
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0,
            self.inserts,
            self.evictions,
            self.promotes,
            self.demotes,
            self.flushes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_insert();
        stats.record_flush();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.inserts, 1);
        assert_eq!(snap.flushes, 1);
        assert!((snap.hit_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_ratio_without_fetches() {
        let snap = CacheStats::new().snapshot();
        assert_eq!(snap.hit_ratio(), 0.0);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_eviction();

        stats.reset();
        assert_eq!(stats.snapshot(), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_display() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();

        let text = stats.snapshot().to_string();
        assert!(text.contains("hit ratio: 50.00%"));
    }
}
