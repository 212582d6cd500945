//! # Core Configuration Module
//!
//! Provides configuration management for the offline core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge the core talks to plus the feature flags.
//! It enforces fail-fast validation so a missing capability is reported at
//! startup rather than on the first cache write.
//!
//! ## Required Dependencies
//!
//! - `KeyValueStore` - Record entries, metadata and the offline queue
//! - `FileSystemAccess` - The binary asset directory
//! - `FileDownloader` - Fetching images into the asset directory
//!
//! ## Optional Dependencies
//!
//! - `RequestExecutor` - Replays queued requests (the queue holds them until one is set)
//! - `NetworkMonitor` - Connectivity detection; without it the queue drains only on demand
//! - `Clock` - Defaults to `SystemClock`
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected for everything except the network monitor:
//! `SqliteKeyValueStore` (at `database_path`), `TokioFileSystem`, and
//! `ReqwestHttpClient` as both downloader and executor.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .key_value_store(Arc::new(MyStore))
//!     .file_system(Arc::new(MyFileSystem))
//!     .downloader(Arc::new(MyDownloader))
//!     .network_monitor(Arc::new(MyMonitor))
//!     .enable_periodic_cleanup(false)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, FileDownloader, FileSystemAccess, KeyValueStore, NetworkMonitor, RequestExecutor,
    SystemClock,
};
#[cfg(feature = "desktop-shims")]
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// Core configuration for the offline core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path of the default SQLite store, when one was configured
    pub database_path: Option<PathBuf>,

    /// Persistent key/value storage (required)
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// File system access for the asset directory (required)
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Image downloader (required)
    pub downloader: Arc<dyn FileDownloader>,

    /// Executor for replayed requests (optional)
    pub request_executor: Option<Arc<dyn RequestExecutor>>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Time source for TTLs and access ordering
    pub clock: Arc<dyn Clock>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// Feature flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("downloader", &"FileDownloader { ... }")
            .field(
                "request_executor",
                &self
                    .request_executor
                    .as_ref()
                    .map(|_| "RequestExecutor { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Queue failed writes for replay; when off, enqueue is rejected
    pub enable_offline_queue: bool,

    /// Expose the binary asset cache
    pub enable_image_cache: bool,

    /// Run the periodic cache sweep in the background
    pub enable_periodic_cleanup: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_offline_queue: true,
            enable_image_cache: true,
            enable_periodic_cleanup: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default {}. \
             Mobile: inject the platform-native implementation.",
            capability, purpose, desktop_default
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_key_value_store(database_path: Option<&Path>) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::SqliteKeyValueStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = database_path.map(Path::to_path_buf).ok_or_else(|| {
        Error::Config(
            "Database path is required for the default SqliteKeyValueStore. \
             Use .database_path() or inject a KeyValueStore."
                .to_string(),
        )
    })?;

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default KeyValueStore: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteKeyValueStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default KeyValueStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so build the store on a plain thread
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default KeyValueStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_key_value_store(
    _database_path: Option<&std::path::Path>,
) -> Result<Arc<dyn KeyValueStore>> {
    Err(capability_missing(
        "KeyValueStore",
        "cache records and the offline queue",
        "SqliteKeyValueStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    let fs: Arc<dyn FileSystemAccess> = Arc::new(bridge_desktop::TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing(
        "FileSystemAccess",
        "the image cache directory",
        "TokioFileSystem",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<bridge_desktop::ReqwestHttpClient>> {
    bridge_desktop::ReqwestHttpClient::new()
        .map(Arc::new)
        .map_err(|e| Error::Internal(format!("Failed to initialize default HTTP client: {}", e)))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    downloader: Option<Arc<dyn FileDownloader>>,
    request_executor: Option<Arc<dyn RequestExecutor>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the database path used by the default SQLite store.
    ///
    /// Ignored when a `KeyValueStore` is injected.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the key/value store implementation.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the image downloader implementation.
    pub fn downloader(mut self, downloader: Arc<dyn FileDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Sets the executor used to replay queued requests.
    pub fn request_executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.request_executor = Some(executor);
        self
    }

    /// Sets the network monitor implementation (optional).
    ///
    /// Connectivity transitions drive queue drainage.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables the offline request queue.
    ///
    /// Default: true
    pub fn enable_offline_queue(mut self, enabled: bool) -> Self {
        self.features.enable_offline_queue = enabled;
        self
    }

    /// Enables or disables the binary asset cache.
    ///
    /// Default: true
    pub fn enable_image_cache(mut self, enabled: bool) -> Self {
        self.features.enable_image_cache = enabled;
        self
    }

    /// Enables or disables the periodic cache sweep.
    ///
    /// Default: true
    pub fn enable_periodic_cleanup(mut self, enabled: bool) -> Self {
        self.features.enable_periodic_cleanup = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - A required bridge is missing and no desktop default applies
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let key_value_store = match self.key_value_store {
            Some(store) => store,
            None => provide_default_key_value_store(self.database_path.as_deref())?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        #[cfg(feature = "desktop-shims")]
        let (downloader, request_executor) = {
            let mut http = None;
            let downloader = match self.downloader {
                Some(downloader) => downloader,
                None => {
                    let client = provide_default_http_client()?;
                    http = Some(client.clone());
                    client as Arc<dyn FileDownloader>
                }
            };
            let request_executor = match self.request_executor {
                Some(executor) => Some(executor),
                None => {
                    let client = match http {
                        Some(client) => client,
                        None => provide_default_http_client()?,
                    };
                    Some(client as Arc<dyn RequestExecutor>)
                }
            };
            (downloader, request_executor)
        };

        #[cfg(not(feature = "desktop-shims"))]
        let (downloader, request_executor) = {
            let downloader = self.downloader.ok_or_else(|| {
                capability_missing("FileDownloader", "the image cache", "ReqwestHttpClient")
            })?;
            (downloader, self.request_executor)
        };

        let config = CoreConfig {
            database_path: self.database_path,
            key_value_store,
            file_system,
            downloader,
            request_executor,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
