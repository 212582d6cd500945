//! # Offline Request Queue
//!
//! Durable, priority-ordered list of write requests that failed for lack of
//! connectivity. The queue decides when a request is replayed; the injected
//! [`RequestExecutor`] decides how.
//!
//! ## Overview
//!
//! - Order is `high > normal > low`, FIFO within a priority, and holds after
//!   every insertion
//! - The whole queue is persisted as one JSON array under a single key after
//!   every mutation
//! - At capacity the oldest low-priority entries are evicted first
//! - A drain replays a snapshot in order; failures increment `retry_count`
//!   and requests are dropped once they reach `max_retries`
//! - At most one drain runs at a time, guarded by a flag claimed
//!   synchronously through [`OfflineRequestQueue::try_begin_drain`]

use bridge_traits::http::{HttpMethod, RequestExecutor};
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::Clock;
use bytes::Bytes;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use core_runtime::logging::redact_if_sensitive;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::request::{sort_queue, Priority, QueuedRequest, RequestId};

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed but kept for a later drain
    pub failed: usize,
    /// Failed for the last time and removed
    pub dropped: usize,
    /// Removed by a caller while the drain was running
    pub skipped: usize,
    /// Queue depth when the drain finished
    pub remaining: usize,
}

/// Proof that the caller owns the single drain slot. Releases it on drop.
#[derive(Debug)]
pub struct DrainPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Durable queue of requests awaiting connectivity.
pub struct OfflineRequestQueue {
    config: QueueConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<QueuedRequest>>,
    depth: AtomicUsize,
    executor: RwLock<Option<Arc<dyn RequestExecutor>>>,
    draining: Arc<AtomicBool>,
    initialized: AtomicBool,
    events: Option<EventBus>,
}

impl OfflineRequestQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            config,
            store,
            clock,
            entries: Mutex::new(Vec::new()),
            depth: AtomicUsize::new(0),
            executor: RwLock::new(None),
            draining: Arc::new(AtomicBool::new(false)),
            initialized: AtomicBool::new(false),
            events: None,
        }
    }

    /// Publish queue events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Load the persisted queue, dropping stale entries.
    ///
    /// An unparsable persisted queue is discarded.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.config.validate().map_err(QueueError::InvalidConfig)?;

        let mut entries = self.entries.lock().await;
        let mut loaded = match self.store.get(&self.config.storage_key).await? {
            Some(raw) => match serde_json::from_slice::<Vec<QueuedRequest>>(&raw) {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!(error = %e, "Discarding unparsable persisted queue");
                    self.store.delete(&self.config.storage_key).await?;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let now = self.clock.unix_timestamp_millis();
        let stale_ms = i64::try_from(self.config.stale_after.as_millis()).unwrap_or(i64::MAX);
        let before = loaded.len();
        loaded.retain(|request| now.saturating_sub(request.enqueued_at) <= stale_ms);
        let stale = before - loaded.len();

        sort_queue(&mut loaded);
        if stale > 0 {
            info!(stale, "Dropped stale queued requests");
            self.persist(&loaded).await?;
        }

        *entries = loaded;
        self.depth.store(entries.len(), Ordering::Release);
        self.initialized.store(true, Ordering::Release);

        info!(depth = entries.len(), "Offline queue loaded");
        Ok(())
    }

    /// Queue a request for delivery once connectivity returns.
    #[instrument(skip(self, payload, headers))]
    pub async fn enqueue(
        &self,
        url: &str,
        method: HttpMethod,
        payload: Option<serde_json::Value>,
        headers: Option<HashMap<String, String>>,
        priority: Priority,
    ) -> Result<RequestId> {
        if !self.config.enabled {
            return Err(QueueError::Disabled);
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(QueueError::NotInitialized);
        }

        let mut request = QueuedRequest::new(url, method, priority, self.clock.unix_timestamp_millis());
        request.payload = payload;
        request.headers = headers.unwrap_or_default();
        for (name, value) in &request.headers {
            debug!(header = %name, value = %redact_if_sensitive(name, value), "Queued header");
        }

        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();

        let evicted = if next.len() >= self.config.max_depth {
            self.evict_low_priority(&mut next)
        } else {
            Vec::new()
        };
        if next.len() >= self.config.max_depth {
            warn!(max_depth = self.config.max_depth, "Offline queue full, rejecting request");
            return Err(QueueError::Full {
                max_depth: self.config.max_depth,
            });
        }

        let id = request.id;
        next.push(request);
        sort_queue(&mut next);

        self.persist(&next).await?;
        *entries = next;
        let depth = entries.len();
        self.depth.store(depth, Ordering::Release);
        drop(entries);

        for request in evicted {
            warn!(request_id = %request.id, url = %request.url, "Evicted low-priority request");
            self.emit(QueueEvent::RequestEvicted {
                request_id: request.id.to_string(),
                url: request.url,
            });
        }
        info!(request_id = %id, priority = %priority, depth, "Request queued");
        self.emit(QueueEvent::RequestQueued {
            request_id: id.to_string(),
            priority: priority.to_string(),
            depth,
        });

        Ok(id)
    }

    /// Remove the oldest share of low-priority entries and return them.
    fn evict_low_priority(&self, entries: &mut Vec<QueuedRequest>) -> Vec<QueuedRequest> {
        let mut low: Vec<(i64, RequestId)> = entries
            .iter()
            .filter(|request| request.priority == Priority::Low)
            .map(|request| (request.enqueued_at, request.id))
            .collect();
        // Stable, so equal timestamps keep queue order
        low.sort_by_key(|(enqueued_at, _)| *enqueued_at);

        let count = self.config.eviction_count(low.len());
        let victims: Vec<RequestId> = low.into_iter().take(count).map(|(_, id)| id).collect();

        let mut evicted = Vec::with_capacity(victims.len());
        entries.retain(|request| {
            if victims.contains(&request.id) {
                evicted.push(request.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove a request. Returns whether it was queued.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: RequestId) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(position) = entries.iter().position(|request| request.id == id) else {
            return false;
        };

        let mut next = entries.clone();
        next.remove(position);
        if let Err(e) = self.persist(&next).await {
            error!(request_id = %id, error = %e, "Failed to persist queue after removal");
            return false;
        }

        *entries = next;
        self.depth.store(entries.len(), Ordering::Release);
        debug!(request_id = %id, "Request removed from queue");
        true
    }

    /// Empty the queue. Returns the number of requests removed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        self.persist(&[]).await?;

        let removed = entries.len();
        entries.clear();
        self.depth.store(0, Ordering::Release);
        info!(removed, "Offline queue cleared");
        Ok(removed)
    }

    /// Number of queued requests. Never blocks.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Queued requests in drain order.
    pub async fn snapshot(&self) -> Vec<QueuedRequest> {
        self.entries.lock().await.clone()
    }

    /// Install the function that performs replayed requests.
    pub fn set_executor(&self, executor: Arc<dyn RequestExecutor>) {
        *self.executor.write() = Some(executor);
        debug!("Request executor installed");
    }

    pub fn has_executor(&self) -> bool {
        self.executor.read().is_some()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Claim the drain slot, or `None` if a drain is already running.
    pub fn try_begin_drain(&self) -> Option<DrainPermit> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainPermit {
                flag: Arc::clone(&self.draining),
            })
    }

    /// Replay every queued request once.
    ///
    /// Returns `None` when a drain is already running or no executor is set.
    pub async fn drain(&self) -> Option<DrainReport> {
        let permit = self.try_begin_drain()?;
        self.drain_with(permit).await
    }

    /// Drain using a slot claimed with [`try_begin_drain`](Self::try_begin_drain).
    #[instrument(skip(self, _permit))]
    pub async fn drain_with(&self, _permit: DrainPermit) -> Option<DrainReport> {
        let executor = self.executor.read().clone();
        let Some(executor) = executor else {
            debug!("No request executor installed, skipping drain");
            return None;
        };

        let snapshot = self.entries.lock().await.clone();
        let mut report = DrainReport::default();
        if snapshot.is_empty() {
            return Some(report);
        }

        info!(pending = snapshot.len(), "Draining offline queue");
        self.emit(QueueEvent::DrainStarted {
            pending: snapshot.len(),
        });

        for (index, request) in snapshot.iter().enumerate() {
            if index > 0 && !self.config.drain_delay.is_zero() {
                tokio::time::sleep(self.config.drain_delay).await;
            }

            if !self.contains(request.id).await {
                debug!(request_id = %request.id, "Request removed during drain, skipping");
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;

            let outcome = match request.to_http_request() {
                Ok(http) => executor.execute(http).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(()) => {
                    self.finish_delivered(request.id).await;
                    report.succeeded += 1;
                }
                Err(reason) => match self.record_failure(request.id, &reason).await {
                    Some(true) => report.dropped += 1,
                    Some(false) => report.failed += 1,
                    None => report.skipped += 1,
                },
            }
        }

        report.remaining = self.depth();
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            remaining = report.remaining,
            "Offline queue drain completed"
        );
        self.emit(QueueEvent::DrainCompleted {
            succeeded: report.succeeded,
            failed: report.failed,
            dropped: report.dropped,
            remaining: report.remaining,
        });

        Some(report)
    }

    async fn contains(&self, id: RequestId) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|request| request.id == id)
    }

    async fn finish_delivered(&self, id: RequestId) {
        let mut entries = self.entries.lock().await;
        entries.retain(|request| request.id != id);
        self.depth.store(entries.len(), Ordering::Release);
        if let Err(e) = self.persist(&entries).await {
            error!(request_id = %id, error = %e, "Failed to persist queue after delivery");
        }
        drop(entries);

        debug!(request_id = %id, "Queued request delivered");
        self.emit(QueueEvent::RequestSent {
            request_id: id.to_string(),
        });
    }

    /// Count a failed delivery. Returns `Some(true)` when the request was
    /// dropped, `Some(false)` when kept, `None` when it is no longer queued.
    async fn record_failure(&self, id: RequestId, reason: &str) -> Option<bool> {
        let mut entries = self.entries.lock().await;
        let position = entries.iter().position(|request| request.id == id)?;

        entries[position].retry_count += 1;
        let retry_count = entries[position].retry_count;
        let dropped = entries[position].is_exhausted(self.config.max_retries);

        let removed = dropped.then(|| entries.remove(position));
        self.depth.store(entries.len(), Ordering::Release);
        if let Err(e) = self.persist(&entries).await {
            error!(request_id = %id, error = %e, "Failed to persist queue after failure");
        }
        drop(entries);

        match removed {
            Some(request) => {
                warn!(
                    request_id = %id,
                    url = %request.url,
                    retry_count,
                    reason,
                    "Dropping queued request after final failed attempt"
                );
                self.emit(QueueEvent::RequestDropped {
                    request_id: id.to_string(),
                    url: request.url,
                    retry_count,
                });
                Some(true)
            }
            None => {
                debug!(request_id = %id, retry_count, reason, "Queued request failed, will retry");
                self.emit(QueueEvent::RequestFailed {
                    request_id: id.to_string(),
                    retry_count,
                });
                Some(false)
            }
        }
    }

    async fn persist(&self, entries: &[QueuedRequest]) -> Result<()> {
        let encoded = serde_json::to_vec(entries)?;
        self.store
            .put(&self.config.storage_key, Bytes::from(encoded))
            .await?;
        Ok(())
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Queue(event));
        }
    }
}
