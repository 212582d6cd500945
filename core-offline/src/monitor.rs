//! # Network State Monitor
//!
//! Tracks the last known connectivity, fans changes out to listeners and
//! starts a queue drain on every disconnected → connected transition.
//!
//! ## Usage
//!
//! ```ignore
//! let monitor = Arc::new(NetworkStateMonitor::new(clock, Some(queue)));
//! let handle = monitor.add_listener(|state| println!("online: {}", state.is_connected));
//!
//! monitor.start(platform_monitor).await;
//! let state = monitor.get_state();
//!
//! handle.unsubscribe();
//! monitor.shutdown().await;
//! ```

use bridge_traits::network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{DrainReport, OfflineRequestQueue};

/// Last known connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_connected: bool,
    pub connection_type: Option<NetworkType>,
    pub is_internet_reachable: Option<bool>,
    /// Unix milliseconds of the last report with connectivity
    pub last_connected_at: Option<i64>,
    pub queue_depth: usize,
}

type Listener = Arc<dyn Fn(&NetworkState) + Send + Sync>;
type ListenerMap = Mutex<BTreeMap<u64, Listener>>;

/// Returned by [`NetworkStateMonitor::add_listener`].
#[must_use = "dropping the handle keeps the listener registered; call unsubscribe() to remove it"]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(&self.id);
        }
    }
}

struct WatchTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Connectivity tracker driving the offline queue.
pub struct NetworkStateMonitor {
    clock: Arc<dyn Clock>,
    queue: Option<Arc<OfflineRequestQueue>>,
    state: RwLock<NetworkState>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
    events: Option<EventBus>,
    watcher: Mutex<Option<WatchTask>>,
    started: AtomicBool,
}

impl NetworkStateMonitor {
    pub fn new(clock: Arc<dyn Clock>, queue: Option<Arc<OfflineRequestQueue>>) -> Self {
        Self {
            clock,
            queue,
            state: RwLock::new(NetworkState::default()),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener_id: AtomicU64::new(0),
            events: None,
            watcher: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Publish connectivity events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Last known state. Never blocks on I/O.
    pub fn get_state(&self) -> NetworkState {
        let mut state = self.state.read().clone();
        if let Some(queue) = &self.queue {
            state.queue_depth = queue.depth();
        }
        state
    }

    /// Register a callback run on every connectivity report.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Arc::new(listener));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Apply a platform connectivity report.
    ///
    /// Returns the drain task when this report is a disconnected → connected
    /// transition and the drain slot was free.
    pub fn handle_network_change(
        &self,
        info: NetworkInfo,
    ) -> Option<JoinHandle<Option<DrainReport>>> {
        let is_connected = info.status == NetworkStatus::Connected
            && info.is_internet_reachable != Some(false);
        let now = self.clock.unix_timestamp_millis();
        let queue_depth = self.queue.as_ref().map_or(0, |queue| queue.depth());

        let (was_connected, state) = {
            let mut state = self.state.write();
            let was_connected = state.is_connected;
            state.is_connected = is_connected;
            state.connection_type = info.network_type;
            state.is_internet_reachable = info.is_internet_reachable;
            state.queue_depth = queue_depth;
            if is_connected {
                state.last_connected_at = Some(now);
            }
            (was_connected, state.clone())
        };

        if was_connected != is_connected {
            info!(
                connected = is_connected,
                connection_type = ?state.connection_type,
                queue_depth,
                "Network state changed"
            );
        } else {
            debug!(connected = is_connected, "Network report without transition");
        }

        self.notify_listeners(&state);
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Network(NetworkEvent::StateChanged {
                is_connected,
                connection_type: state.connection_type.map(|t| t.as_str().to_string()),
                queue_depth,
            }));
        }

        if !was_connected && is_connected {
            self.trigger_drain()
        } else {
            None
        }
    }

    fn notify_listeners(&self, state: &NetworkState) {
        let listeners: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(state))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(listener_id = id, panic = %message, "Network listener panicked");
            }
        }
    }

    /// Spawn a drain if the queue's drain slot is free.
    ///
    /// The slot is claimed before the task is spawned, so a second trigger
    /// arriving before the task runs is dropped.
    fn trigger_drain(&self) -> Option<JoinHandle<Option<DrainReport>>> {
        let queue = self.queue.as_ref()?;
        let Some(permit) = queue.try_begin_drain() else {
            debug!("Drain already running, ignoring reconnect trigger");
            return None;
        };

        info!(depth = queue.depth(), "Connectivity restored, draining offline queue");
        let queue = Arc::clone(queue);
        Some(tokio::spawn(async move { queue.drain_with(permit).await }))
    }

    /// Read the current connectivity once, then follow platform changes in
    /// the background until [`shutdown`](Self::shutdown).
    pub async fn start(self: &Arc<Self>, platform: Arc<dyn NetworkMonitor>) {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Network monitor already started");
            return;
        }

        match platform.get_network_info().await {
            Ok(info) => {
                self.handle_network_change(info);
            }
            Err(e) => warn!(error = %e, "Initial network probe failed"),
        }

        let mut changes = match platform.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, "Network change subscription unavailable");
                self.started.store(false, Ordering::Release);
                return;
            }
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Network watcher cancelled");
                        break;
                    }
                    next = changes.next() => {
                        let Some(info) = next else {
                            debug!("Network change stream ended");
                            break;
                        };
                        let Some(monitor) = monitor.upgrade() else {
                            break;
                        };
                        monitor.handle_network_change(info);
                    }
                }
            }
        });

        *self.watcher.lock() = Some(WatchTask { cancel, handle });
        info!("Network monitor started");
    }

    /// Stop following platform changes.
    pub async fn shutdown(&self) {
        let task = self.watcher.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                error!(error = %e, "Network watcher ended abnormally");
            }
            info!("Network monitor stopped");
        }
        self.started.store(false, Ordering::Release);
    }
}
