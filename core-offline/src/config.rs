//! Offline queue configuration

use std::time::Duration;

/// Configuration for the offline request queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Accept new requests (default: true)
    pub enabled: bool,

    /// Maximum number of queued requests (default: 100)
    pub max_depth: usize,

    /// Failed deliveries before a request is dropped (default: 3)
    pub max_retries: u32,

    /// Pause between requests while draining (default: 500ms)
    pub drain_delay: Duration,

    /// Persisted requests older than this are discarded on load (default: 24h)
    pub stale_after: Duration,

    /// Share of low-priority entries evicted when full, in percent (default: 30)
    pub low_priority_eviction_percent: u8,

    /// Key holding the persisted queue (default: "offline_request_queue")
    pub storage_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 100,
            max_retries: 3,
            drain_delay: Duration::from_millis(500),
            stale_after: Duration::from_secs(24 * 60 * 60),
            low_priority_eviction_percent: 30,
            storage_key: "offline_request_queue".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.stale_after = window;
        self
    }

    pub fn with_low_priority_eviction_percent(mut self, percent: u8) -> Self {
        self.low_priority_eviction_percent = percent;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Number of low-priority entries evicted out of `low_count`.
    pub fn eviction_count(&self, low_count: usize) -> usize {
        let percent = self.low_priority_eviction_percent as usize;
        (low_count * percent).div_ceil(100).min(low_count)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }

        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        if self.stale_after.is_zero() {
            return Err("stale_after must be greater than 0".to_string());
        }

        if self.low_priority_eviction_percent == 0 || self.low_priority_eviction_percent > 100 {
            return Err("low_priority_eviction_percent must be between 1 and 100".to_string());
        }

        if self.storage_key.is_empty() {
            return Err("storage_key must not be empty".to_string());
        }

        Ok(())
    }
}
