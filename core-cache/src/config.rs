//! Cache configuration and limits

use std::time::Duration;

/// Configuration for the cache coordinator.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total byte ceiling across all entries (default: 100 MiB)
    pub max_size_bytes: u64,

    /// Entry count ceiling (default: 1000)
    pub max_entries: usize,

    /// TTL used when `set` is called without one (default: 24h)
    pub default_ttl: Duration,

    /// TTL of downloaded images (default: 7 days)
    pub image_ttl: Duration,

    /// Interval of the background sweep (default: 1h)
    pub cleanup_interval: Duration,

    /// Share of entries removed per eviction pass, in percent (default: 20)
    pub eviction_percent: u8,

    /// Entries written with another version read as corrupt (default: 1)
    pub schema_version: u32,

    /// Asset subdirectory under the platform cache directory (default: "images")
    pub image_directory: String,

    /// Minimum age before the sweep deletes an unreferenced file (default: 1h)
    pub orphan_grace_period: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            max_entries: 1000,
            default_ttl: Duration::from_secs(24 * 60 * 60),
            image_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            eviction_percent: 20,
            schema_version: 1,
            image_directory: "images".to_string(),
            orphan_grace_period: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte ceiling.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the entry count ceiling.
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_image_ttl(mut self, ttl: Duration) -> Self {
        self.image_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_eviction_percent(mut self, percent: u8) -> Self {
        self.eviction_percent = percent;
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Set image directory name.
    pub fn with_image_directory(mut self, dir: impl Into<String>) -> Self {
        self.image_directory = dir.into();
        self
    }

    pub fn with_orphan_grace_period(mut self, grace: Duration) -> Self {
        self.orphan_grace_period = grace;
        self
    }

    /// Number of entries one eviction pass removes out of `count`.
    ///
    /// Rounds up and never returns zero for a non-empty cache.
    pub fn eviction_batch(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let percent = self.eviction_percent as usize;
        ((count * percent).div_ceil(100)).clamp(1, count)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size_bytes == 0 {
            return Err("max_size_bytes must be greater than 0".to_string());
        }

        if self.max_entries == 0 {
            return Err("max_entries must be at least 1".to_string());
        }

        if self.default_ttl.is_zero() || self.image_ttl.is_zero() {
            return Err("TTLs must be greater than 0".to_string());
        }

        if self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be greater than 0".to_string());
        }

        if self.eviction_percent == 0 || self.eviction_percent > 100 {
            return Err("eviction_percent must be between 1 and 100".to_string());
        }

        if self.image_directory.is_empty()
            || self.image_directory.contains(['/', '\\'])
            || self.image_directory == ".."
        {
            return Err("image_directory must be a single non-empty path segment".to_string());
        }

        Ok(())
    }
}
