//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `KeyValueStore` using an SQLite table via `sqlx`
//! - `FileSystemAccess` using `tokio::fs` and the `dirs` cache directory
//! - `RequestExecutor` and `FileDownloader` using `reqwest`
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let store = SqliteKeyValueStore::new("offline.db".into()).await?;
//!     let fs = TokioFileSystem::new();
//!     let http = ReqwestHttpClient::new()?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod kv_store;
mod network;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use kv_store::SqliteKeyValueStore;
pub use network::DesktopNetworkMonitor;
