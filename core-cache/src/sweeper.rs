//! Periodic sweep of expired records and orphaned asset files

use core_runtime::events::CacheEvent;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::category::{image_filename, image_record_prefix};
use crate::context::CacheContext;
use crate::error::Result;
use crate::image_cache::PART_SUFFIX;
use crate::record_store::Lookup;
use crate::stats::CleanupReport;

impl CacheContext {
    /// Remove expired and corrupt records, dangling metadata and old orphan
    /// files.
    ///
    /// Keys are snapshotted up front and each one is re-read under the
    /// mutation lock, so an entry refreshed after the snapshot survives.
    pub async fn sweep(&self) -> Result<CleanupReport> {
        let started = Instant::now();
        let mut report = CleanupReport::default();

        for key in self.records.entry_keys().await? {
            let _guard = self.mutation_lock.lock().await;
            let lookup = match self.records.read::<serde_json::Value>(&key).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable entry during sweep");
                    continue;
                }
            };

            match lookup {
                Lookup::Expired(_) => report.expired_removed += 1,
                Lookup::Corrupt => report.corrupt_removed += 1,
                Lookup::Fresh(_) | Lookup::Missing => continue,
            }
            if image_filename(&key).is_some() {
                report.images_removed += 1;
            }
            if let Err(e) = self.purge_entry_locked(&key).await {
                warn!(key = %key, error = %e, "Failed to purge entry during sweep");
            }
        }

        {
            let _guard = self.mutation_lock.lock().await;
            for key in self.records.dangling_metadata().await? {
                debug!(key = %key, "Removing metadata without entry");
                self.records.remove_metadata(&key).await?;
            }
        }

        report.images_removed += self.sweep_orphan_files().await?;

        let now = self.records.now_millis();
        self.stats.set_last_cleanup(now);
        self.stats.invalidate();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            expired = report.expired_removed,
            corrupt = report.corrupt_removed,
            images = report.images_removed,
            duration_ms = report.duration_ms,
            "Cache cleanup completed"
        );
        self.emit(CacheEvent::CleanupCompleted {
            expired_removed: report.expired_removed + report.corrupt_removed,
            images_removed: report.images_removed,
            duration_ms: report.duration_ms,
        });

        Ok(report)
    }

    /// Delete unreferenced files (including abandoned `.part` downloads)
    /// whose modification time is older than the grace period.
    async fn sweep_orphan_files(&self) -> Result<usize> {
        let Ok(dir) = self.image_dir() else {
            return Ok(0);
        };
        let grace_ms = i64::try_from(self.config.orphan_grace_period.as_millis()).unwrap_or(i64::MAX);

        let _guard = self.mutation_lock.lock().await;
        let now = self.records.now_millis();
        let mut removed = 0;

        for path in self.fs.list_directory(&dir).await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if !name.ends_with(PART_SUFFIX) {
                let referenced = !self
                    .records
                    .keys_with_prefix(&image_record_prefix(name))
                    .await?
                    .is_empty();
                if referenced {
                    continue;
                }
            }

            let metadata = match self.fs.metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if metadata.is_directory {
                continue;
            }
            let Some(modified_ms) = metadata.modified_at.map(|secs| secs.saturating_mul(1000)) else {
                continue;
            };

            if now.saturating_sub(modified_ms) >= grace_ms && self.remove_file_if_present(&path).await? {
                debug!(file = name, "Deleted orphaned image file");
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Run `sweep` every `period` until cancelled or the cache is dropped.
///
/// The first sweep happens one period after start. A sweep in progress
/// finishes before cancellation is observed.
pub(crate) fn spawn_cleanup_task(
    context: Weak<CacheContext>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cache cleanup task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(context) = context.upgrade() else {
                        break;
                    };
                    if let Err(e) = context.sweep().await {
                        error!(error = %e, "Periodic cache cleanup failed");
                    }
                }
            }
        }
    })
}
