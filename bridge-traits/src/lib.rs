//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is implemented differently per platform (desktop,
//! iOS, Android).
//!
//! ## Traits
//!
//! ### Persistence
//! - [`KeyValueStore`](storage::KeyValueStore) - Opaque string key to byte value persistence
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the binary asset directory
//!
//! ### Networking
//! - [`FileDownloader`](http::FileDownloader) - Download a remote file to a local path
//! - [`RequestExecutor`](http::RequestExecutor) - Perform a replayed write request
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity state and change stream
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and include context (file paths, keys, URLs) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::KeyValueStore;
//! use bytes::Bytes;
//!
//! async fn remember(store: &dyn KeyValueStore) -> bridge_traits::error::Result<()> {
//!     store.put("greeting", Bytes::from_static(b"hello")).await?;
//!     assert!(store.get("greeting").await?.is_some());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{FileDownloader, HttpMethod, HttpRequest, RequestExecutor};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{FileMetadata, FileSystemAccess, KeyValueStore};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
