//! # Cache Error Types
//!
//! Public data operations recover from these locally (absent value, `false`,
//! zero count) and log them; lifecycle calls return them.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur inside the record store and asset cache.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// The key/value store or file system rejected an operation.
    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Configuration failed validation.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// An operation ran before `initialize()`.
    #[error("Cache not initialized")]
    NotInitialized,

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// An image download failed or produced an empty file.
    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A single asset is larger than the whole cache may hold.
    #[error("Asset of {size_bytes} bytes exceeds the {max_bytes} byte cache limit")]
    TooLarge { size_bytes: u64, max_bytes: u64 },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
