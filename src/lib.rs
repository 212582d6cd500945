//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-service`, `core-cache`, `core-offline`). Host applications can
//! depend on `offline-core-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "cache-only")]
pub use core_cache as cache;

#[cfg(feature = "queue-only")]
pub use core_offline as offline;
