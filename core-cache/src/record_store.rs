//! Persistent record store
//!
//! TTL-bounded JSON records over a [`KeyValueStore`], with a metadata record
//! kept beside every entry for LRU and size accounting. The store does no
//! locking of its own; callers serialize mutations.

use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::Clock;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::category::{metadata_key, CacheCategory, ENTRY_PREFIX, METADATA_PREFIX};
use crate::entry::{CacheEntry, CacheMetadata};
use crate::error::Result;

/// Outcome of reading a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Missing,
    /// Unparsable value or schema mismatch
    Corrupt,
    Expired(CacheEntry<T>),
    Fresh(CacheEntry<T>),
}

impl<T> Lookup<T> {
    /// Whether the record exists but must be purged.
    pub fn is_stale(&self) -> bool {
        matches!(self, Lookup::Corrupt | Lookup::Expired(_))
    }
}

/// Record persistence shared by the coordinator and the image cache.
pub struct RecordStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    schema_version: u32,
}

impl RecordStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, schema_version: u32) -> Self {
        Self {
            store,
            clock,
            schema_version,
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Write an entry and its metadata.
    ///
    /// The metadata size is the serialized length unless `size_override` is
    /// given (image records account for the file on disk). Returns the size
    /// recorded.
    pub async fn write<T: Serialize>(
        &self,
        storage_key: &str,
        data: &T,
        category: CacheCategory,
        ttl: Duration,
        owner_id: Option<&str>,
        size_override: Option<u64>,
    ) -> Result<u64> {
        let now = self.now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);

        let entry = CacheEntry {
            data,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            schema_version: self.schema_version,
            owner_id: owner_id.map(str::to_string),
        };
        let encoded = serde_json::to_vec(&entry)?;
        let size_bytes = size_override.unwrap_or(encoded.len() as u64);

        self.store.put(storage_key, Bytes::from(encoded)).await?;

        let metadata = CacheMetadata {
            key: storage_key.to_string(),
            size_bytes,
            last_accessed: now,
            access_count: 1,
            category,
        };
        self.put_metadata(&metadata).await?;

        debug!(key = storage_key, size_bytes, "Record written");
        Ok(size_bytes)
    }

    /// Read and classify an entry. Never deletes anything.
    pub async fn read<T: DeserializeOwned>(&self, storage_key: &str) -> Result<Lookup<T>> {
        let Some(raw) = self.store.get(storage_key).await? else {
            return Ok(Lookup::Missing);
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = storage_key, error = %e, "Unparsable cache entry");
                return Ok(Lookup::Corrupt);
            }
        };

        if entry.schema_version != self.schema_version {
            debug!(
                key = storage_key,
                found = entry.schema_version,
                expected = self.schema_version,
                "Cache entry schema mismatch"
            );
            return Ok(Lookup::Corrupt);
        }

        if entry.is_expired(self.now_millis()) {
            return Ok(Lookup::Expired(entry));
        }

        Ok(Lookup::Fresh(entry))
    }

    /// Record an access. Rebuilds missing metadata from the entry itself.
    pub async fn touch(&self, storage_key: &str) -> Result<()> {
        let now = self.now_millis();

        let metadata = match self.metadata(storage_key).await? {
            Some(mut metadata) => {
                metadata.last_accessed = now;
                metadata.access_count = metadata.access_count.saturating_add(1);
                metadata
            }
            None => {
                let Some(raw) = self.store.get(storage_key).await? else {
                    return Ok(());
                };
                let Some(category) = CacheCategory::from_storage_key(storage_key) else {
                    return Ok(());
                };
                CacheMetadata {
                    key: storage_key.to_string(),
                    size_bytes: raw.len() as u64,
                    last_accessed: now,
                    access_count: 1,
                    category,
                }
            }
        };

        self.put_metadata(&metadata).await
    }

    /// Delete an entry and its metadata. Idempotent.
    pub async fn remove(&self, storage_key: &str) -> Result<()> {
        self.store.delete(storage_key).await?;
        self.store.delete(&metadata_key(storage_key)).await?;
        Ok(())
    }

    /// Delete a metadata record that has no entry.
    pub async fn remove_metadata(&self, storage_key: &str) -> Result<()> {
        self.store.delete(&metadata_key(storage_key)).await?;
        Ok(())
    }

    pub async fn metadata(&self, storage_key: &str) -> Result<Option<CacheMetadata>> {
        match self.store.get(&metadata_key(storage_key)).await? {
            Some(raw) => match serde_json::from_slice(&raw) {
                Ok(metadata) => Ok(Some(metadata)),
                Err(e) => {
                    warn!(key = storage_key, error = %e, "Unparsable cache metadata");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn put_metadata(&self, metadata: &CacheMetadata) -> Result<()> {
        let encoded = serde_json::to_vec(metadata)?;
        self.store
            .put(&metadata_key(&metadata.key), Bytes::from(encoded))
            .await?;
        Ok(())
    }

    /// Every entry key in the namespace.
    pub async fn entry_keys(&self) -> Result<Vec<String>> {
        self.keys_with_prefix(ENTRY_PREFIX).await
    }

    /// Entry keys starting with `prefix`.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.store.list_keys(prefix).await?)
    }

    /// Every readable metadata record. Unparsable records are skipped.
    pub async fn all_metadata(&self) -> Result<Vec<CacheMetadata>> {
        let prefix = format!("{}{}", METADATA_PREFIX, ENTRY_PREFIX);
        let keys = self.store.list_keys(&prefix).await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<CacheMetadata>(&raw) {
                Ok(metadata) => records.push(metadata),
                Err(e) => warn!(key = %key, error = %e, "Skipping unparsable metadata"),
            }
        }
        Ok(records)
    }

    /// Storage keys of metadata records whose entry is gone.
    pub async fn dangling_metadata(&self) -> Result<Vec<String>> {
        let prefix = format!("{}{}", METADATA_PREFIX, ENTRY_PREFIX);
        let mut dangling = Vec::new();
        for key in self.store.list_keys(&prefix).await? {
            let Some(entry_key) = key.strip_prefix(METADATA_PREFIX) else {
                continue;
            };
            if !self.store.contains(entry_key).await? {
                dangling.push(entry_key.to_string());
            }
        }
        Ok(dangling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteKeyValueStore;
    use bridge_traits::time::ManualClock;

    async fn store_with_clock() -> (RecordStore, Arc<ManualClock>, Arc<SqliteKeyValueStore>) {
        let kv = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let records = RecordStore::new(kv.clone(), clock.clone(), 1);
        (records, clock, kv)
    }

    #[tokio::test]
    async fn test_write_then_read_fresh() {
        let (records, _clock, _kv) = store_with_clock().await;

        let size = records
            .write(
                "cache_user_data_k",
                &vec![1, 2, 3],
                CacheCategory::UserData,
                Duration::from_secs(60),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(size > 0);

        match records.read::<Vec<i32>>("cache_user_data_k").await.unwrap() {
            Lookup::Fresh(entry) => {
                assert_eq!(entry.data, vec![1, 2, 3]);
                assert_eq!(entry.expires_at - entry.created_at, 60_000);
            }
            other => panic!("expected fresh entry, got {:?}", other),
        }

        let metadata = records.metadata("cache_user_data_k").await.unwrap().unwrap();
        assert_eq!(metadata.access_count, 1);
        assert_eq!(metadata.size_bytes, size);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_clamped() {
        let (records, clock, _kv) = store_with_clock().await;

        records
            .write("cache_audio_a", &1u8, CacheCategory::Audio, Duration::ZERO, None, None)
            .await
            .unwrap();
        assert!(matches!(
            records.read::<u8>("cache_audio_a").await.unwrap(),
            Lookup::Fresh(_)
        ));

        clock.advance(Duration::from_millis(2));
        assert!(records.read::<u8>("cache_audio_a").await.unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_corrupt_and_schema_mismatch() {
        let (records, clock, kv) = store_with_clock().await;

        kv.put("cache_audio_bad", Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        assert_eq!(
            records.read::<u8>("cache_audio_bad").await.unwrap(),
            Lookup::Corrupt
        );

        let newer = RecordStore::new(kv.clone(), clock.clone(), 2);
        newer
            .write("cache_audio_v2", &1u8, CacheCategory::Audio, Duration::from_secs(1), None, None)
            .await
            .unwrap();
        assert_eq!(
            records.read::<u8>("cache_audio_v2").await.unwrap(),
            Lookup::Corrupt
        );
    }

    #[tokio::test]
    async fn test_touch_updates_and_rebuilds_metadata() {
        let (records, clock, _kv) = store_with_clock().await;
        records
            .write("cache_audio_t", &"x", CacheCategory::Audio, Duration::from_secs(60), None, None)
            .await
            .unwrap();

        clock.advance(Duration::from_millis(500));
        records.touch("cache_audio_t").await.unwrap();
        let metadata = records.metadata("cache_audio_t").await.unwrap().unwrap();
        assert_eq!(metadata.access_count, 2);
        assert_eq!(metadata.last_accessed, 1_000_500);

        records.remove_metadata("cache_audio_t").await.unwrap();
        assert_eq!(records.dangling_metadata().await.unwrap(), Vec::<String>::new());
        records.touch("cache_audio_t").await.unwrap();
        let rebuilt = records.metadata("cache_audio_t").await.unwrap().unwrap();
        assert_eq!(rebuilt.category, CacheCategory::Audio);
        assert_eq!(rebuilt.access_count, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_scans() {
        let (records, _clock, _kv) = store_with_clock().await;
        for key in ["cache_audio_a", "cache_images_b"] {
            records
                .write(key, &0u8, CacheCategory::from_storage_key(key).unwrap(), Duration::from_secs(5), None, None)
                .await
                .unwrap();
        }

        let mut keys = records.entry_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache_audio_a", "cache_images_b"]);
        assert_eq!(records.all_metadata().await.unwrap().len(), 2);

        records.remove("cache_audio_a").await.unwrap();
        records.remove("cache_audio_a").await.unwrap();
        assert_eq!(records.entry_keys().await.unwrap(), vec!["cache_images_b"]);
        assert_eq!(records.all_metadata().await.unwrap().len(), 1);
    }
}
