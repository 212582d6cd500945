//! # Offline Cache
//!
//! Persistent, size- and age-bounded storage for structured records and
//! downloaded image files.
//!
//! ## Overview
//!
//! - [`RecordStore`] persists TTL-bounded JSON records with per-entry
//!   metadata through the platform `KeyValueStore`
//! - [`ImageCache`] downloads images into a content-addressed directory and
//!   validates them on every read
//! - [`CacheCoordinator`] is the public API: lazy expiry, LRU eviction,
//!   owner-scoped clearing, statistics and a periodic sweeper
//!
//! All mutations go through one async lock, so a sweep never deletes an
//! entry written after it took its key snapshot.

pub mod category;
pub mod config;
mod context;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod image_cache;
pub mod record_store;
pub mod stats;
mod sweeper;

pub use category::CacheCategory;
pub use config::CacheConfig;
pub use coordinator::CacheCoordinator;
pub use entry::{CacheEntry, CacheMetadata, ImageCacheEntry};
pub use error::{CacheError, Result};
pub use image_cache::{image_filename_for_url, ImageCache};
pub use record_store::{Lookup, RecordStore};
pub use stats::{CacheStats, CleanupReport};
