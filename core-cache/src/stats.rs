//! Cache statistics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::category::CacheCategory;
use crate::entry::CacheMetadata;

/// Snapshot of cache usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Sum of metadata sizes in bytes
    pub total_size: u64,
    /// Number of stored entries
    pub total_files: usize,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    /// Unix milliseconds of the last completed sweep
    pub last_cleanup: Option<i64>,
    pub per_category_size: BTreeMap<CacheCategory, u64>,
}

impl CacheStats {
    /// Aggregate sizes from metadata records.
    pub fn from_metadata(records: &[CacheMetadata]) -> Self {
        let mut per_category_size = BTreeMap::new();
        let mut total_size = 0u64;

        for record in records {
            total_size = total_size.saturating_add(record.size_bytes);
            *per_category_size.entry(record.category).or_insert(0u64) += record.size_bytes;
        }

        Self {
            total_size,
            total_files: records.len(),
            per_category_size,
            ..Self::default()
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired_removed: usize,
    pub corrupt_removed: usize,
    pub images_removed: usize,
    pub duration_ms: u64,
}

/// Live counters plus the cached size scan.
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    last_cleanup: Mutex<Option<i64>>,
    /// Bumped on every invalidation so a scan racing a mutation is discarded
    generation: AtomicU64,
    scan: Mutex<Option<CacheStats>>,
}

impl StatsTracker {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_cleanup(&self, at_millis: i64) {
        *self.last_cleanup.lock() = Some(at_millis);
    }

    /// Drop the cached scan after a mutation.
    pub fn invalidate(&self) {
        let mut scan = self.scan.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *scan = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn cached_scan(&self) -> Option<CacheStats> {
        self.scan.lock().clone()
    }

    /// Cache a scan started at `generation` unless a mutation happened since.
    pub fn store_scan(&self, generation: u64, scan: CacheStats) {
        let mut cached = self.scan.lock();
        if self.generation.load(Ordering::Acquire) == generation {
            *cached = Some(scan);
        }
    }

    /// Overlay the live counters on a size scan.
    pub fn finish(&self, mut stats: CacheStats) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        stats.hits = hits;
        stats.misses = misses;
        stats.hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        stats.last_cleanup = *self.last_cleanup.lock();
        stats
    }
}
