//! # Event Bus System
//!
//! Provides an event-driven architecture for the offline core using `tokio::sync::broadcast`.
//! This module lets the cache, the network monitor and the request queue report what
//! they did without knowing who is listening.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for each domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   emit    ┌───────────┐
//! │ CacheCoordinator├──────────>│           │
//! └─────────────────┘           │           │
//!                               │ EventBus  │   subscribe   ┌────────────┐
//! ┌─────────────────┐   emit    │ (broadcast├──────────────>│ Subscriber │
//! │ NetworkMonitor  ├──────────>│  channel) │               └────────────┘
//! └─────────────────┘           │           │
//!                               │           │   subscribe   ┌────────────┐
//! ┌─────────────────┐   emit    │           ├──────────────>│ Subscriber │
//! │ RequestQueue    ├──────────>│           │               └────────────┘
//! └─────────────────┘           └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, QueueEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut drops = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Queue(QueueEvent::RequestDropped { .. })));
//!
//! event_bus.emit(CoreEvent::Queue(QueueEvent::RequestDropped {
//!     request_id: "42".to_string(),
//!     url: "https://api.example.com/likes".to_string(),
//!     retry_count: 3,
//! })).ok();
//!
//! let event = drops.recv().await.unwrap();
//! assert_eq!(event.description(), "Queued request dropped");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error from [`EventBus::emit`]; producers
//! in this workspace ignore it with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Record and image cache events
    Cache(CacheEvent),
    /// Connectivity events
    Network(NetworkEvent),
    /// Offline request queue events
    Queue(QueueEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Queue(QueueEvent::RequestDropped { .. }) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::RequestEvicted { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::EntriesEvicted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::CleanupCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Network(NetworkEvent::StateChanged { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::DrainCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Cache Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// Least recently used entries were removed to get back under the limits
    EntriesEvicted { count: usize, freed_bytes: u64 },
    /// A periodic or manual sweep finished
    CleanupCompleted {
        expired_removed: usize,
        images_removed: usize,
        duration_ms: u64,
    },
    /// Entries were cleared, for one owner or for everyone
    Cleared {
        owner_id: Option<String>,
        removed: usize,
    },
    /// An image was downloaded into the asset cache
    ImageCached { url: String, size_bytes: u64 },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::EntriesEvicted { .. } => "Cache entries evicted",
            CacheEvent::CleanupCompleted { .. } => "Cache cleanup completed",
            CacheEvent::Cleared { .. } => "Cache cleared",
            CacheEvent::ImageCached { .. } => "Image cached",
        }
    }
}

// ============================================================================
// Network Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    StateChanged {
        is_connected: bool,
        connection_type: Option<String>,
        queue_depth: usize,
    },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::StateChanged {
                is_connected: true, ..
            } => "Network connected",
            NetworkEvent::StateChanged { .. } => "Network disconnected",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    RequestQueued {
        request_id: String,
        priority: String,
        depth: usize,
    },
    /// A low-priority request was pushed out to make room
    RequestEvicted { request_id: String, url: String },
    RequestSent { request_id: String },
    RequestFailed {
        request_id: String,
        retry_count: u32,
    },
    /// A request exhausted its retries and was permanently removed
    RequestDropped {
        request_id: String,
        url: String,
        retry_count: u32,
    },
    DrainStarted { pending: usize },
    DrainCompleted {
        succeeded: usize,
        failed: usize,
        dropped: usize,
        remaining: usize,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::RequestQueued { .. } => "Request queued for later delivery",
            QueueEvent::RequestEvicted { .. } => "Queued request evicted",
            QueueEvent::RequestSent { .. } => "Queued request delivered",
            QueueEvent::RequestFailed { .. } => "Queued request failed",
            QueueEvent::RequestDropped { .. } => "Queued request dropped",
            QueueEvent::DrainStarted { .. } => "Queue drain started",
            QueueEvent::DrainCompleted { .. } => "Queue drain completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscription to the event bus.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Wrapper around a broadcast receiver with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events for which `predicate` returns true are yielded.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when no matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dropped(id: &str) -> CoreEvent {
        CoreEvent::Queue(QueueEvent::RequestDropped {
            request_id: id.to_string(),
            url: "https://api.example.com/likes".to_string(),
            retry_count: 3,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::default();

        // Should error when no subscribers
        assert!(bus.emit(dropped("1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Network(NetworkEvent::StateChanged {
            is_connected: true,
            connection_type: Some("wi_fi".to_string()),
            queue_depth: 2,
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Queue(_)));

        bus.emit(CoreEvent::Cache(CacheEvent::Cleared {
            owner_id: None,
            removed: 4,
        }))
        .ok();
        bus.emit(dropped("7")).ok();

        assert_eq!(stream.recv().await.unwrap(), dropped("7"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(dropped(&i.to_string())).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(dropped("1").severity(), EventSeverity::Warning);

        let cleanup = CoreEvent::Cache(CacheEvent::CleanupCompleted {
            expired_removed: 3,
            images_removed: 1,
            duration_ms: 12,
        });
        assert_eq!(cleanup.severity(), EventSeverity::Info);

        let sent = CoreEvent::Queue(QueueEvent::RequestSent {
            request_id: "1".to_string(),
        });
        assert_eq!(sent.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let offline = CoreEvent::Network(NetworkEvent::StateChanged {
            is_connected: false,
            connection_type: None,
            queue_depth: 0,
        });
        assert_eq!(offline.description(), "Network disconnected");
        assert_eq!(dropped("1").description(), "Queued request dropped");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Queue(QueueEvent::DrainCompleted {
            succeeded: 2,
            failed: 1,
            dropped: 0,
            remaining: 1,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Queue");
        assert_eq!(json["payload"]["event"], "DrainCompleted");

        let deserialized: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, event);
    }
}
