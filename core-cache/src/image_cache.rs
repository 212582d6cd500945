//! # Binary Asset Cache
//!
//! Downloads remote images into the asset directory and keeps an `Images`
//! record per owner describing each file.
//!
//! ## Overview
//!
//! - Files are content-addressed by URL: `sha256(url)` in hex plus the URL's
//!   extension, so every owner shares one file per URL
//! - Downloads land in a uniquely named `.part` file and are renamed into
//!   place before any record is written
//! - Reads validate the file against its record (existence, non-zero size,
//!   expiry, size match) and purge both on any mismatch
//! - A file without a record is adopted on read

use bridge_traits::http::FileDownloader;
use core_runtime::events::CacheEvent;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::category::{
    belongs_to, image_filename, image_record_key, image_record_prefix, is_valid_owner,
    storage_key, CacheCategory,
};
use crate::context::CacheContext;
use crate::entry::ImageCacheEntry;
use crate::error::{CacheError, Result};
use crate::record_store::Lookup;

const DEFAULT_EXTENSION: &str = "jpg";

/// Suffix of in-flight downloads
pub const PART_SUFFIX: &str = ".part";

/// Asset filename for `url`.
pub fn image_filename_for_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}.{}", hasher.finalize(), extension_for(url))
}

/// Lowercased extension of the URL path, or `jpg`.
fn extension_for(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = after_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("");
    let segment = path.rsplit('/').next().unwrap_or(path);

    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn mime_type_for(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Downloads and validates cached image files.
pub struct ImageCache {
    context: Arc<CacheContext>,
    downloader: Arc<dyn FileDownloader>,
}

impl ImageCache {
    pub(crate) fn new(context: Arc<CacheContext>, downloader: Arc<dyn FileDownloader>) -> Self {
        Self {
            context,
            downloader,
        }
    }

    /// Return the local file for `url`, downloading it when needed.
    ///
    /// Failed or empty downloads leave nothing behind and return `None`.
    #[instrument(skip(self))]
    pub async fn cache_image(&self, url: &str, owner_id: Option<&str>) -> Option<PathBuf> {
        let dir = match self.context.image_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "cache_image called before initialize");
                return None;
            }
        };
        if let Some(owner) = owner_id.filter(|owner| !is_valid_owner(owner)) {
            warn!(owner, "Rejecting image with an invalid owner id");
            return None;
        }
        let filename = image_filename_for_url(url);
        let final_path = dir.join(&filename);

        {
            let _guard = self.context.mutation_lock.lock().await;
            match self.validate_locked(url, owner_id, &filename, &final_path).await {
                Ok(Some(path)) => {
                    debug!(url = url, "Image already cached");
                    return Some(path);
                }
                Ok(None) => {}
                Err(e) => warn!(url = url, error = %e, "Image validation failed"),
            }
        }

        match self.download(url, &dir, &filename, owner_id).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(url = url, error = %e, "Image download failed");
                None
            }
        }
    }

    /// Return the local file for `url` if a valid copy is cached.
    #[instrument(skip(self))]
    pub async fn get_cached_image(&self, url: &str, owner_id: Option<&str>) -> Option<PathBuf> {
        let dir = match self.context.image_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "get_cached_image called before initialize");
                return None;
            }
        };
        let filename = image_filename_for_url(url);
        let path = dir.join(&filename);

        let _guard = self.context.mutation_lock.lock().await;
        match self.validate_locked(url, owner_id, &filename, &path).await {
            Ok(Some(path)) => {
                self.context.stats.record_hit();
                Some(path)
            }
            Ok(None) => {
                self.context.stats.record_miss();
                None
            }
            Err(e) => {
                warn!(url = url, error = %e, "Image lookup failed");
                self.context.stats.record_miss();
                None
            }
        }
    }

    /// Delete unreferenced files and records whose file is gone.
    ///
    /// Records are checked for `owner_id` only, or for everyone when `None`.
    /// In-flight `.part` files are left to the periodic sweep.
    #[instrument(skip(self))]
    pub async fn clean_orphaned_files(&self, owner_id: Option<&str>) -> usize {
        match self.clean_orphaned_files_inner(owner_id).await {
            Ok(removed) => {
                info!(removed, "Orphaned images cleaned");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Orphan cleanup failed");
                0
            }
        }
    }

    async fn clean_orphaned_files_inner(&self, owner_id: Option<&str>) -> Result<usize> {
        let dir = self.context.image_dir()?;
        let _guard = self.context.mutation_lock.lock().await;
        let mut removed = 0;

        for path in self.context.fs.list_directory(&dir).await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(PART_SUFFIX) {
                continue;
            }
            let referenced = !self
                .context
                .records
                .keys_with_prefix(&image_record_prefix(name))
                .await?
                .is_empty();
            if !referenced && self.context.remove_file_if_present(&path).await? {
                debug!(file = name, "Deleted unreferenced image");
                removed += 1;
            }
        }

        let prefix = storage_key(CacheCategory::Images, "image_", None);
        for key in self.context.records.keys_with_prefix(&prefix).await? {
            if owner_id.is_some_and(|owner| !belongs_to(&key, owner)) {
                continue;
            }
            let Some(filename) = image_filename(&key) else {
                continue;
            };
            if !self.context.fs.exists(&dir.join(filename)).await? {
                self.context.records.remove(&key).await?;
                debug!(key = %key, "Dropped image record without file");
                removed += 1;
            }
        }

        if removed > 0 {
            self.context.stats.invalidate();
        }
        Ok(removed)
    }

    /// Check the record and file for `url`, purging on mismatch and adopting
    /// record-less files. Caller must hold `mutation_lock`.
    async fn validate_locked(
        &self,
        url: &str,
        owner_id: Option<&str>,
        filename: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        let key = storage_key(CacheCategory::Images, &image_record_key(filename), owner_id);
        let file_size = match self.context.fs.metadata(path).await {
            Ok(metadata) => Some(metadata.size),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        match self.context.records.read::<ImageCacheEntry>(&key).await? {
            Lookup::Fresh(entry) => {
                let now = self.context.records.now_millis();
                let intact = file_size.is_some_and(|size| size > 0 && size == entry.data.size_bytes);

                if !intact {
                    warn!(
                        url = url,
                        expected = entry.data.size_bytes,
                        found = ?file_size,
                        "Cached image failed validation"
                    );
                    self.context.records.remove(&key).await?;
                    self.context.remove_file_if_present(path).await?;
                    self.context.stats.invalidate();
                    return Ok(None);
                }

                if now > entry.data.expires_at {
                    self.context.purge_entry_locked(&key).await?;
                    return Ok(None);
                }

                self.context.records.touch(&key).await?;
                Ok(Some(path.to_path_buf()))
            }
            Lookup::Expired(_) | Lookup::Corrupt => {
                self.context.purge_entry_locked(&key).await?;
                Ok(None)
            }
            Lookup::Missing => match file_size {
                Some(size) if size > 0 && size <= self.context.config.max_size_bytes => {
                    info!(url = url, size, "Adopting image file without record");
                    self.record_locked(url, owner_id, filename, path, size).await?;
                    Ok(Some(path.to_path_buf()))
                }
                Some(_) => {
                    self.context.remove_file_if_present(path).await?;
                    Ok(None)
                }
                None => Ok(None),
            },
        }
    }

    async fn download(
        &self,
        url: &str,
        dir: &Path,
        filename: &str,
        owner_id: Option<&str>,
    ) -> Result<PathBuf> {
        let part_path = dir.join(format!("{}.{}{}", filename, Uuid::new_v4(), PART_SUFFIX));
        let final_path = dir.join(filename);

        let size = match self.fetch_to_part(url, &part_path).await {
            Ok(size) => size,
            Err(e) => {
                self.discard_part(&part_path).await;
                return Err(e);
            }
        };

        if size == 0 {
            self.discard_part(&part_path).await;
            return Err(CacheError::DownloadFailed {
                url: url.to_string(),
                reason: "empty response".to_string(),
            });
        }

        let max_bytes = self.context.config.max_size_bytes;
        if size > max_bytes {
            self.discard_part(&part_path).await;
            return Err(CacheError::TooLarge {
                size_bytes: size,
                max_bytes,
            });
        }

        if let Err(e) = self.context.fs.rename(&part_path, &final_path).await {
            self.discard_part(&part_path).await;
            return Err(e.into());
        }

        let _guard = self.context.mutation_lock.lock().await;
        self.record_locked(url, owner_id, filename, &final_path, size)
            .await?;

        info!(url = url, size_bytes = size, "Image cached");
        self.context.emit(CacheEvent::ImageCached {
            url: url.to_string(),
            size_bytes: size,
        });
        Ok(final_path)
    }

    async fn discard_part(&self, part_path: &Path) {
        if let Err(e) = self.context.remove_file_if_present(part_path).await {
            debug!(path = ?part_path, error = %e, "Failed to remove partial download");
        }
    }

    /// Download into `part_path` and return the size on disk.
    async fn fetch_to_part(&self, url: &str, part_path: &Path) -> Result<u64> {
        self.downloader
            .download_to(url, part_path)
            .await
            .map_err(|e| CacheError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(self.context.fs.metadata(part_path).await?.size)
    }

    /// Write the image record and enforce limits. Caller must hold
    /// `mutation_lock`.
    async fn record_locked(
        &self,
        url: &str,
        owner_id: Option<&str>,
        filename: &str,
        path: &Path,
        size: u64,
    ) -> Result<()> {
        let ttl = self.context.config.image_ttl;
        let now = self.context.records.now_millis();
        let image = ImageCacheEntry {
            local_path: path.to_path_buf(),
            original_url: url.to_string(),
            created_at: now,
            expires_at: now.saturating_add(duration_millis(ttl)),
            size_bytes: size,
            mime_type: mime_type_for(filename).map(str::to_string),
        };

        let key = storage_key(CacheCategory::Images, &image_record_key(filename), owner_id);
        self.context
            .records
            .write(&key, &image, CacheCategory::Images, ttl, owner_id, Some(size))
            .await?;
        self.context.stats.invalidate();
        self.context.enforce_limits_locked(&key).await?;
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX).max(1)
}
