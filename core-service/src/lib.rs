//! # Offline Core Service
//!
//! Façade that wires the host bridges from a [`CoreConfig`] into the record
//! and image cache, the offline request queue and the network monitor, and
//! runs their lifecycle as one unit.
//!
//! ## Usage
//!
//! ```ignore
//! use core_cache::CacheConfig;
//! use core_offline::{Priority, QueueConfig};
//! use core_runtime::config::CoreConfig;
//! use core_service::{OfflineCore, SubmitOutcome};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/app/offline.db")
//!     .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
//!     .build()?;
//!
//! let core = OfflineCore::new(config, CacheConfig::default(), QueueConfig::default())?;
//! core.initialize().await?;
//!
//! let request = HttpRequest::new(HttpMethod::Post, "https://api.example.com/likes")
//!     .json(&serde_json::json!({ "track": 42 }))?;
//! match core.submit(request, Priority::High).await {
//!     SubmitOutcome::Sent => {}
//!     SubmitOutcome::Queued(id) => println!("queued as {id}"),
//!     SubmitOutcome::Rejected(e) => eprintln!("dropped: {e}"),
//! }
//!
//! core.shutdown().await;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

use std::sync::Arc;

use bridge_traits::http::HttpRequest;
use core_cache::{CacheConfig, CacheCoordinator, ImageCache};
use core_offline::{NetworkStateMonitor, OfflineRequestQueue, Priority, QueueConfig, RequestId};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Result of [`OfflineCore::submit`].
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Delivered immediately
    Sent,
    /// Held in the offline queue for replay
    Queued(RequestId),
    /// Neither delivered nor queued
    Rejected(ServiceError),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Rejected(_))
    }
}

/// Primary façade exposed to host applications.
pub struct OfflineCore {
    config: CoreConfig,
    events: EventBus,
    cache: Arc<CacheCoordinator>,
    queue: Arc<OfflineRequestQueue>,
    network: Arc<NetworkStateMonitor>,
    started: Mutex<bool>,
}

impl OfflineCore {
    /// Build every service from `config`. Nothing touches storage until
    /// [`initialize`](Self::initialize).
    pub fn new(config: CoreConfig, cache_config: CacheConfig, queue_config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);

        let cache = CacheCoordinator::new(
            Arc::clone(&config.key_value_store),
            Arc::clone(&config.file_system),
            Arc::clone(&config.downloader),
            Arc::clone(&config.clock),
            cache_config,
        )
        .with_event_bus(events.clone());

        let queue_enabled = queue_config.enabled && config.features.enable_offline_queue;
        let queue = Arc::new(
            OfflineRequestQueue::new(
                Arc::clone(&config.key_value_store),
                Arc::clone(&config.clock),
                queue_config.with_enabled(queue_enabled),
            )
            .with_event_bus(events.clone()),
        );

        let network = NetworkStateMonitor::new(Arc::clone(&config.clock), Some(Arc::clone(&queue)))
            .with_event_bus(events.clone());

        Ok(Self {
            config,
            events,
            cache: Arc::new(cache),
            queue,
            network: Arc::new(network),
            started: Mutex::new(false),
        })
    }

    /// Prepare the cache, load the persisted queue and start the background
    /// work. Calling it again after a successful start is a no-op.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut started = self.started.lock().await;
        if *started {
            debug!("Offline core already initialized");
            return Ok(());
        }

        self.cache.initialize().await?;
        self.queue.initialize().await?;

        if self.config.features.enable_periodic_cleanup {
            self.cache.start_cleanup()?;
        }

        if let Some(executor) = &self.config.request_executor {
            self.queue.set_executor(Arc::clone(executor));
        }

        if let Some(monitor) = &self.config.network_monitor {
            self.network.start(Arc::clone(monitor)).await;
        }

        *started = true;
        info!(
            queue_depth = self.queue.depth(),
            queue_enabled = self.queue.config().enabled,
            image_cache = self.config.features.enable_image_cache,
            network_monitor = self.config.network_monitor.is_some(),
            "Offline core initialized"
        );
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        *self.started.lock().await
    }

    /// Stop the network watcher and the cache sweeper.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut started = self.started.lock().await;
        self.network.shutdown().await;
        self.cache.shutdown().await;
        *started = false;
        info!("Offline core shut down");
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    /// The binary asset cache, unless disabled by feature flag.
    pub fn images(&self) -> Option<&ImageCache> {
        self.config
            .features
            .enable_image_cache
            .then(|| self.cache.images())
    }

    pub fn queue(&self) -> &Arc<OfflineRequestQueue> {
        &self.queue
    }

    pub fn network(&self) -> &Arc<NetworkStateMonitor> {
        &self.network
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Deliver `request` now when online, otherwise hold it for replay.
    ///
    /// A failed direct delivery is queued as well; only a disabled or full
    /// queue, or a body that is not JSON, rejects the request.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn submit(&self, request: HttpRequest, priority: Priority) -> SubmitOutcome {
        if self.network.get_state().is_connected {
            if let Some(executor) = &self.config.request_executor {
                match executor.execute(request.clone()).await {
                    Ok(()) => {
                        debug!("Request delivered directly");
                        return SubmitOutcome::Sent;
                    }
                    Err(e) => warn!(error = %e, "Direct delivery failed, queueing request"),
                }
            }
        }

        self.enqueue(request, priority).await
    }

    async fn enqueue(&self, request: HttpRequest, priority: Priority) -> SubmitOutcome {
        let payload = match &request.body {
            None => None,
            Some(_) => match request.json_body() {
                Some(payload) => Some(payload),
                None => {
                    return SubmitOutcome::Rejected(ServiceError::InvalidRequest(
                        "only JSON bodies can be queued".to_string(),
                    ))
                }
            },
        };
        let headers = (!request.headers.is_empty()).then_some(request.headers);

        match self
            .queue
            .enqueue(&request.url, request.method, payload, headers, priority)
            .await
        {
            Ok(id) => SubmitOutcome::Queued(id),
            Err(e) => {
                warn!(error = %e, "Request rejected by the offline queue");
                SubmitOutcome::Rejected(e.into())
            }
        }
    }
}
