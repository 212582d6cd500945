//! Persisted record shapes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::category::CacheCategory;

/// A stored record with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds; the entry is unreadable once `now > expires_at`
    pub expires_at: i64,
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at
    }
}

/// Bookkeeping kept 1:1 with every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Storage key of the entry
    pub key: String,
    pub size_bytes: u64,
    /// Unix milliseconds
    pub last_accessed: i64,
    pub access_count: u64,
    pub category: CacheCategory,
}

/// Data of an image record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCacheEntry {
    pub local_path: PathBuf,
    pub original_url: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}
