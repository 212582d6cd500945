//! # Cache Coordinator
//!
//! Public entry point of the cache. Wraps the record store and the image
//! cache, enforces size and count limits, and owns the periodic sweeper.
//!
//! ## Usage
//!
//! ```ignore
//! use core_cache::{CacheCategory, CacheConfig, CacheCoordinator};
//!
//! let cache = CacheCoordinator::new(store, fs, downloader, clock, CacheConfig::default());
//! cache.initialize().await?;
//! cache.start_cleanup()?;
//!
//! cache.set("profile", &profile, CacheCategory::UserData, None, Some("user-1")).await;
//! let profile: Option<Profile> = cache.get("profile", CacheCategory::UserData, Some("user-1")).await;
//!
//! cache.shutdown().await;
//! ```

use bridge_traits::http::FileDownloader;
use bridge_traits::storage::{FileSystemAccess, KeyValueStore};
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, EventBus};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::category::{belongs_to, is_valid_owner, storage_key, CacheCategory};
use crate::config::CacheConfig;
use crate::context::CacheContext;
use crate::error::{CacheError, Result};
use crate::image_cache::ImageCache;
use crate::record_store::RecordStore;
use crate::stats::{CacheStats, CleanupReport};
use crate::sweeper::spawn_cleanup_task;

struct CleanupTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Size- and age-bounded cache for records and image files.
pub struct CacheCoordinator {
    context: Arc<CacheContext>,
    images: ImageCache,
    cleanup: Mutex<Option<CleanupTask>>,
}

impl CacheCoordinator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        fs: Arc<dyn FileSystemAccess>,
        downloader: Arc<dyn FileDownloader>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        let records = RecordStore::new(store, clock, config.schema_version);
        let context = Arc::new(CacheContext::new(config, records, fs));
        let images = ImageCache::new(Arc::clone(&context), downloader);

        Self {
            context,
            images,
            cleanup: Mutex::new(None),
        }
    }

    /// Publish cache events on `bus`.
    pub fn with_event_bus(self, bus: EventBus) -> Self {
        self.context.set_event_bus(bus);
        self
    }

    /// Validate the configuration and create the image directory.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.context
            .config
            .validate()
            .map_err(CacheError::InvalidConfig)?;

        let dir = self
            .context
            .fs
            .get_cache_directory()
            .await?
            .join(&self.context.config.image_directory);
        self.context.fs.create_dir_all(&dir).await?;
        self.context.set_image_dir(dir);

        info!(
            max_size_bytes = self.context.config.max_size_bytes,
            max_entries = self.context.config.max_entries,
            "Cache initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_initialized()
    }

    /// Start the periodic sweeper. Calling it again while running is a no-op.
    pub fn start_cleanup(&self) -> Result<()> {
        if !self.context.is_initialized() {
            return Err(CacheError::NotInitialized);
        }

        let mut cleanup = self.cleanup.lock();
        if cleanup.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let handle = spawn_cleanup_task(
            Arc::downgrade(&self.context),
            self.context.config.cleanup_interval,
            cancel.clone(),
        );
        *cleanup = Some(CleanupTask { cancel, handle });

        info!(
            interval_secs = self.context.config.cleanup_interval.as_secs(),
            "Cache cleanup scheduled"
        );
        Ok(())
    }

    /// Stop the sweeper and wait for a sweep in progress to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let task = self.cleanup.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                error!(error = %e, "Cache cleanup task ended abnormally");
            }
            info!("Cache cleanup stopped");
        }
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Store `data`, then evict if over the limits. `ttl` defaults to
    /// `default_ttl`.
    #[instrument(skip(self, data))]
    pub async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
        category: CacheCategory,
        ttl: Option<Duration>,
        owner_id: Option<&str>,
    ) -> bool {
        if !self.ready("set") {
            return false;
        }
        if let Some(owner) = owner_id.filter(|owner| !is_valid_owner(owner)) {
            warn!(owner, "Rejecting write with an invalid owner id");
            return false;
        }
        let storage_key = storage_key(category, key, owner_id);
        let ttl = ttl.unwrap_or(self.context.config.default_ttl);

        let _guard = self.context.mutation_lock.lock().await;
        if let Err(e) = self
            .context
            .records
            .write(&storage_key, data, category, ttl, owner_id, None)
            .await
        {
            error!(key = %storage_key, error = %e, "Failed to write cache entry");
            return false;
        }
        self.context.stats.invalidate();

        if let Err(e) = self.context.enforce_limits_locked(&storage_key).await {
            warn!(error = %e, "Cache eviction failed");
        }
        true
    }

    /// Fetch a fresh value. Expired and corrupt entries are purged.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        category: CacheCategory,
        owner_id: Option<&str>,
    ) -> Option<T> {
        if !self.ready("get") {
            return None;
        }
        let storage_key = storage_key(category, key, owner_id);

        let _guard = self.context.mutation_lock.lock().await;
        match self.context.read_valid_locked::<T>(&storage_key).await {
            Ok(Some(entry)) => {
                if let Err(e) = self.context.records.touch(&storage_key).await {
                    warn!(key = %storage_key, error = %e, "Failed to update access metadata");
                }
                self.context.stats.record_hit();
                Some(entry.data)
            }
            Ok(None) => {
                self.context.stats.record_miss();
                None
            }
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Cache read failed");
                self.context.stats.record_miss();
                None
            }
        }
    }

    /// Whether a fresh value exists. Does not count as an access.
    #[instrument(skip(self))]
    pub async fn has(&self, key: &str, category: CacheCategory, owner_id: Option<&str>) -> bool {
        if !self.ready("has") {
            return false;
        }
        let storage_key = storage_key(category, key, owner_id);

        let _guard = self.context.mutation_lock.lock().await;
        match self
            .context
            .read_valid_locked::<serde_json::Value>(&storage_key)
            .await
        {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Cache lookup failed");
                false
            }
        }
    }

    /// Remove a value. Removing a missing value succeeds.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str, category: CacheCategory, owner_id: Option<&str>) -> bool {
        if !self.ready("delete") {
            return false;
        }
        let storage_key = storage_key(category, key, owner_id);

        let _guard = self.context.mutation_lock.lock().await;
        match self.context.purge_entry_locked(&storage_key).await {
            Ok(_) => true,
            Err(e) => {
                error!(key = %storage_key, error = %e, "Failed to delete cache entry");
                false
            }
        }
    }

    /// Remove one owner's entries, or everything when `owner_id` is `None`.
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub async fn clear_all(&self, owner_id: Option<&str>) -> usize {
        if !self.ready("clear_all") {
            return 0;
        }

        let result = match owner_id {
            Some(owner) => self.clear_owner(owner).await,
            None => self.clear_everything().await,
        };

        match result {
            Ok(removed) => {
                info!(removed, owner = ?owner_id, "Cache cleared");
                self.context.emit(CacheEvent::Cleared {
                    owner_id: owner_id.map(str::to_string),
                    removed,
                });
                removed
            }
            Err(e) => {
                error!(error = %e, "Failed to clear cache");
                0
            }
        }
    }

    async fn clear_owner(&self, owner: &str) -> Result<usize> {
        let _guard = self.context.mutation_lock.lock().await;
        let mut removed = 0;

        for key in self.context.records.entry_keys().await? {
            if belongs_to(&key, owner) {
                self.context.purge_entry_locked(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear_everything(&self) -> Result<usize> {
        let _guard = self.context.mutation_lock.lock().await;
        let keys = self.context.records.entry_keys().await?;

        for key in &keys {
            self.context.records.remove(key).await?;
        }
        for key in self.context.records.dangling_metadata().await? {
            self.context.records.remove_metadata(&key).await?;
        }

        let dir = self.context.image_dir()?;
        if self.context.fs.exists(&dir).await? {
            self.context.fs.delete_dir_all(&dir).await?;
        }
        self.context.fs.create_dir_all(&dir).await?;

        self.context.stats.invalidate();
        Ok(keys.len())
    }

    // ========================================================================
    // Statistics & Maintenance
    // ========================================================================

    /// Usage statistics. Sizes come from a cached metadata scan that is
    /// refreshed after mutations; hit counters are always current.
    pub async fn get_stats(&self) -> CacheStats {
        let stats = &self.context.stats;
        if let Some(scan) = stats.cached_scan() {
            return stats.finish(scan);
        }

        let generation = stats.generation();
        match self.context.records.all_metadata().await {
            Ok(records) => {
                let scan = CacheStats::from_metadata(&records);
                stats.store_scan(generation, scan.clone());
                stats.finish(scan)
            }
            Err(e) => {
                warn!(error = %e, "Failed to scan cache metadata");
                stats.finish(CacheStats::default())
            }
        }
    }

    /// Sweep expired and corrupt entries and orphaned files now.
    #[instrument(skip(self))]
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        if !self.context.is_initialized() {
            return Err(CacheError::NotInitialized);
        }
        self.context.sweep().await
    }

    /// Binary asset cache sharing this coordinator's storage and limits.
    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn config(&self) -> &CacheConfig {
        &self.context.config
    }

    fn ready(&self, operation: &str) -> bool {
        let ready = self.context.is_initialized();
        if !ready {
            debug!(operation, "Cache used before initialize");
        }
        ready
    }
}
