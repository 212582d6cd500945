//! # Offline Queue Error Types

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors returned by the offline request queue.
#[derive(Error, Debug)]
pub enum QueueError {
    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// The offline queue feature is turned off.
    #[error("Offline queue is disabled")]
    Disabled,

    /// The queue is at capacity and holds no low-priority entry to evict.
    #[error("Offline queue is full ({max_depth} entries)")]
    Full { max_depth: usize },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// The key/value store rejected a read or write.
    #[error("Queue storage error: {0}")]
    Storage(#[from] BridgeError),

    /// A request or the persisted queue could not be encoded.
    #[error("Queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// An operation ran before `initialize()`.
    #[error("Offline queue not initialized")]
    NotInitialized,
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
