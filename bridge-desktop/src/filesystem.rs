//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

const APP_DIRECTORY: &str = "offline-core";

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - Platform-specific cache directory from `dirs`
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a new file system accessor rooted at the platform cache directory
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIRECTORY);

        Self { cache_dir }
    }

    /// Create a new file system accessor with a custom cache directory
    pub fn with_cache_directory(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn unix_seconds(time: std::io::Result<SystemTime>) -> Option<i64> {
        time.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.cache_dir)
            .await
            .map_err(Self::map_io_error)?
        {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(Self::map_io_error)?;
            debug!(path = ?self.cache_dir, "Created cache directory");
        }
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: Self::unix_seconds(metadata.created()),
            modified_at: Self::unix_seconds(metadata.modified()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(Self::map_io_error)?
        {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_root() -> PathBuf {
        env::temp_dir().join(format!("offline-core-fs-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_custom_cache_directory_is_created() {
        let root = temp_root();
        let fs = TokioFileSystem::with_cache_directory(root.clone());

        let cache_dir = fs.get_cache_directory().await.unwrap();
        assert_eq!(cache_dir, root);
        assert!(fs.exists(&root).await.unwrap());

        fs.delete_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_into_place() {
        let root = temp_root();
        let fs = TokioFileSystem::with_cache_directory(root.clone());
        let part = root.join("images").join("a.jpg.part");
        let target = root.join("images").join("a.jpg");

        let data = b"Hello, World!";
        fs.create_dir_all(&root.join("images")).await.unwrap();
        std::fs::write(&part, data).unwrap();
        fs.rename(&part, &target).await.unwrap();

        assert!(!fs.exists(&part).await.unwrap());
        assert_eq!(std::fs::read(&target).unwrap(), data);

        let metadata = fs.metadata(&target).await.unwrap();
        assert_eq!(metadata.size, data.len() as u64);
        assert!(metadata.modified_at.is_some());

        let listed = fs.list_directory(&root.join("images")).await.unwrap();
        assert_eq!(listed, vec![target.clone()]);

        fs.delete_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_not_found() {
        let fs = TokioFileSystem::with_cache_directory(temp_root());
        let err = fs
            .delete_file(&env::temp_dir().join(format!("missing-{}", uuid::Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
