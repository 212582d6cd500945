//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for key/value persistence and file I/O.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations used by the binary asset cache:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app cache directories
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn publish(fs: &dyn FileSystemAccess, part: &Path) -> Result<()> {
///     let cache_dir = fs.get_cache_directory().await?;
///     fs.create_dir_all(&cache_dir.join("images")).await?;
///     fs.rename(part, &cache_dir.join("images").join("ab12.jpg")).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// This directory is suitable for files that can be deleted by the
    /// system when storage is low.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Atomically move a file into place, replacing any existing target
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Key-value persistence trait
///
/// Arbitrary string key to opaque byte value. Abstracts platform storage:
/// - iOS: UserDefaults / file-backed store
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed table
///
/// Every `put` is a whole-value overwrite. Implementations MUST make the
/// overwrite atomic: after a crash a reader observes either the previous or
/// the new value, never a mix.
///
/// Serialization stays with the caller so the primitive itself is generic.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn save(store: &dyn KeyValueStore, json: Vec<u8>) -> Result<()> {
///     store.put("offline_request_queue", json.into()).await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a value, replacing any previous value
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Retrieve a value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys starting with `prefix` (all keys when empty)
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if a key exists
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
