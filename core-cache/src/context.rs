//! State shared by the coordinator, the image cache and the sweeper

use bridge_traits::storage::FileSystemAccess;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::category::{image_filename, image_record_prefix};
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::record_store::{Lookup, RecordStore};
use crate::stats::StatsTracker;

pub(crate) struct CacheContext {
    pub config: CacheConfig,
    pub records: RecordStore,
    pub fs: Arc<dyn FileSystemAccess>,
    /// Serializes writes, purge-on-read and sweep deletions
    pub mutation_lock: Mutex<()>,
    pub stats: StatsTracker,
    events: RwLock<Option<EventBus>>,
    image_dir: RwLock<Option<PathBuf>>,
}

impl CacheContext {
    pub fn new(config: CacheConfig, records: RecordStore, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            config,
            records,
            fs,
            mutation_lock: Mutex::new(()),
            stats: StatsTracker::default(),
            events: RwLock::new(None),
            image_dir: RwLock::new(None),
        }
    }

    pub fn set_event_bus(&self, bus: EventBus) {
        *self.events.write() = Some(bus);
    }

    pub fn emit(&self, event: CacheEvent) {
        if let Some(bus) = self.events.read().as_ref() {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }

    pub fn set_image_dir(&self, dir: PathBuf) {
        *self.image_dir.write() = Some(dir);
    }

    pub fn is_initialized(&self) -> bool {
        self.image_dir.read().is_some()
    }

    pub fn image_dir(&self) -> Result<PathBuf> {
        self.image_dir.read().clone().ok_or(CacheError::NotInitialized)
    }

    /// Read an entry, purging it when expired or corrupt.
    ///
    /// Caller must hold `mutation_lock`.
    pub async fn read_valid_locked<T: DeserializeOwned>(
        &self,
        storage_key: &str,
    ) -> Result<Option<CacheEntry<T>>> {
        match self.records.read::<T>(storage_key).await? {
            Lookup::Fresh(entry) => Ok(Some(entry)),
            Lookup::Missing => Ok(None),
            Lookup::Expired(_) | Lookup::Corrupt => {
                debug!(key = storage_key, "Purging stale entry on read");
                self.purge_entry_locked(storage_key).await?;
                Ok(None)
            }
        }
    }

    /// Delete an entry with its metadata, and its file for image records
    /// nobody else references. Returns the bytes freed.
    ///
    /// Caller must hold `mutation_lock`.
    pub async fn purge_entry_locked(&self, storage_key: &str) -> Result<u64> {
        let freed = self
            .records
            .metadata(storage_key)
            .await?
            .map(|metadata| metadata.size_bytes)
            .unwrap_or(0);

        self.records.remove(storage_key).await?;

        if let Some(filename) = image_filename(storage_key) {
            self.release_image_file_locked(filename).await?;
        }

        self.stats.invalidate();
        Ok(freed)
    }

    /// Delete an asset file once no record under any owner points at it.
    ///
    /// Caller must hold `mutation_lock`.
    pub async fn release_image_file_locked(&self, filename: &str) -> Result<bool> {
        let referenced = !self
            .records
            .keys_with_prefix(&image_record_prefix(filename))
            .await?
            .is_empty();
        if referenced {
            return Ok(false);
        }

        let Ok(dir) = self.image_dir() else {
            return Ok(false);
        };
        self.remove_file_if_present(&dir.join(filename)).await
    }

    pub async fn remove_file_if_present(&self, path: &Path) -> Result<bool> {
        match self.fs.delete_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Evict least recently accessed entries when over either ceiling.
    /// `keep` is the entry just written and is never a candidate.
    ///
    /// Caller must hold `mutation_lock`.
    pub async fn enforce_limits_locked(&self, keep: &str) -> Result<usize> {
        let mut records = self.records.all_metadata().await?;
        let count = records.len();
        let total_size: u64 = records.iter().map(|m| m.size_bytes).sum();

        if total_size <= self.config.max_size_bytes && count <= self.config.max_entries {
            return Ok(0);
        }

        let batch = self.config.eviction_batch(count);
        records.retain(|metadata| metadata.key != keep);
        records.sort_by_key(|metadata| metadata.last_accessed);

        let mut evicted = 0usize;
        let mut freed_bytes = 0u64;
        for metadata in records.iter().take(batch) {
            freed_bytes += self.purge_entry_locked(&metadata.key).await?;
            evicted += 1;
        }
        if evicted == 0 {
            return Ok(0);
        }

        info!(
            evicted,
            freed_bytes,
            total_size,
            entries = count,
            "Evicted least recently used entries"
        );
        self.emit(CacheEvent::EntriesEvicted {
            count: evicted,
            freed_bytes,
        });

        Ok(evicted)
    }
}
