//! # Offline Request Queue & Network State Monitor
//!
//! Keeps write requests that failed for lack of connectivity and replays
//! them when the network comes back.
//!
//! ## Overview
//!
//! - [`OfflineRequestQueue`] persists pending requests in priority order and
//!   drains them through an injected `RequestExecutor`
//! - [`NetworkStateMonitor`] tracks connectivity reported by the platform
//!   `NetworkMonitor`, notifies listeners and triggers a drain on reconnect
//!
//! Delivery is at-least-once: a request whose response is lost is replayed
//! on the next drain, so servers must treat replays idempotently.

pub mod config;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod request;

pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use monitor::{ListenerHandle, NetworkState, NetworkStateMonitor};
pub use queue::{DrainPermit, DrainReport, OfflineRequestQueue};
pub use request::{Priority, QueuedRequest, RequestId};
