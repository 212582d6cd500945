//! Integration tests for the cache coordinator and image cache
//!
//! Run against the desktop bridges: SQLite in memory and a temp directory.

use async_trait::async_trait;
use bridge_desktop::{SqliteKeyValueStore, TokioFileSystem};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::FileDownloader;
use bridge_traits::time::ManualClock;
use core_cache::{image_filename_for_url, CacheCategory, CacheConfig, CacheCoordinator, CacheError};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Test doubles
// ============================================================================

struct TestDownloader {
    body: Mutex<Vec<u8>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl TestDownloader {
    fn new(body: &[u8]) -> Self {
        Self {
            body: Mutex::new(body.to_vec()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileDownloader for TestDownloader {
    async fn download_to(&self, _url: &str, destination: &Path) -> BridgeResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            // Leave a partial file behind to check the caller cleans it up
            std::fs::write(destination, b"partial")?;
            return Err(BridgeError::OperationFailed("connection reset".to_string()));
        }
        let body = self.body.lock().clone();
        std::fs::write(destination, &body)?;
        Ok(body.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    volume: u8,
}

struct Fixture {
    cache: CacheCoordinator,
    clock: Arc<ManualClock>,
    downloader: Arc<TestDownloader>,
    root: PathBuf,
}

impl Fixture {
    async fn new(config: CacheConfig) -> Self {
        let root = std::env::temp_dir().join(format!("core-cache-test-{}", Uuid::new_v4()));
        let fs = Arc::new(TokioFileSystem::with_cache_directory(root.clone()));
        let store = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
        let clock = Arc::new(ManualClock::starting_now());
        let downloader = Arc::new(TestDownloader::new(b"\x89PNG fake image bytes"));

        let cache = CacheCoordinator::new(store, fs, downloader.clone(), clock.clone(), config);
        cache.initialize().await.unwrap();

        Self {
            cache,
            clock,
            downloader,
            root,
        }
    }

    fn image_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    fn image_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.image_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn tick(&self) {
        self.clock.advance(Duration::from_millis(10));
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn profile(name: &str) -> Profile {
    Profile {
        name: name.to_string(),
        volume: 7,
    }
}

const IMAGE_URL: &str = "https://cdn.example.com/covers/album.png?w=300";

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn test_set_get_round_trip() {
    let fx = Fixture::new(CacheConfig::default()).await;

    assert!(fx.cache.set("profile", &profile("ada"), CacheCategory::UserData, None, None).await);

    let loaded: Option<Profile> = fx.cache.get("profile", CacheCategory::UserData, None).await;
    assert_eq!(loaded, Some(profile("ada")));

    // Same key in another category is a different record
    let other: Option<Profile> = fx.cache.get("profile", CacheCategory::Audio, None).await;
    assert_eq!(other, None);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let fx = Fixture::new(CacheConfig::default()).await;

    fx.cache
        .set(
            "eq",
            &vec![1, 2, 3],
            CacheCategory::RequestSettings,
            Some(Duration::from_millis(1000)),
            None,
        )
        .await;
    assert!(fx.cache.has("eq", CacheCategory::RequestSettings, None).await);

    fx.clock.advance(Duration::from_millis(1500));

    assert!(!fx.cache.has("eq", CacheCategory::RequestSettings, None).await);
    let value: Option<Vec<i32>> = fx.cache.get("eq", CacheCategory::RequestSettings, None).await;
    assert_eq!(value, None);
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_expiry_is_exact_to_the_millisecond() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache
        .set("k", &1u8, CacheCategory::Audio, Some(Duration::from_millis(1000)), None)
        .await;

    fx.clock.advance(Duration::from_millis(1000));
    assert!(fx.cache.has("k", CacheCategory::Audio, None).await);

    fx.clock.advance(Duration::from_millis(1));
    assert!(!fx.cache.has("k", CacheCategory::Audio, None).await);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache.set("k", &"v", CacheCategory::UserData, None, None).await;

    assert!(fx.cache.delete("k", CacheCategory::UserData, None).await);
    assert!(fx.cache.delete("k", CacheCategory::UserData, None).await);
    assert!(!fx.cache.has("k", CacheCategory::UserData, None).await);
}

#[tokio::test]
async fn test_owner_isolation() {
    let fx = Fixture::new(CacheConfig::default()).await;

    fx.cache.set("p", &profile("a"), CacheCategory::UserData, None, Some("A")).await;
    fx.cache.set("p", &profile("b"), CacheCategory::UserData, None, Some("B")).await;
    fx.cache.set("p", &profile("shared"), CacheCategory::UserData, None, None).await;

    let a: Option<Profile> = fx.cache.get("p", CacheCategory::UserData, Some("A")).await;
    assert_eq!(a, Some(profile("a")));

    assert_eq!(fx.cache.clear_all(Some("A")).await, 1);

    assert!(!fx.cache.has("p", CacheCategory::UserData, Some("A")).await);
    assert!(fx.cache.has("p", CacheCategory::UserData, Some("B")).await);
    assert!(fx.cache.has("p", CacheCategory::UserData, None).await);
}

#[tokio::test]
async fn test_corrupt_entry_reads_as_absent() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache.set("n", &"not a number", CacheCategory::UserData, None, None).await;

    let value: Option<u64> = fx.cache.get("n", CacheCategory::UserData, None).await;
    assert_eq!(value, None);
    assert!(!fx.cache.has("n", CacheCategory::UserData, None).await);
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test]
async fn test_lru_eviction_removes_least_recently_accessed() {
    let fx = Fixture::new(CacheConfig::default().with_max_entries(4)).await;

    for i in 0..4 {
        fx.cache.set(&format!("k{}", i), &i, CacheCategory::Audio, None, None).await;
        fx.tick();
    }

    // Reading k0 makes k1 the least recently accessed
    let _: Option<i32> = fx.cache.get("k0", CacheCategory::Audio, None).await;
    fx.tick();
    // has() is not an access
    assert!(fx.cache.has("k1", CacheCategory::Audio, None).await);
    fx.tick();

    fx.cache.set("k4", &4, CacheCategory::Audio, None, None).await;

    assert!(!fx.cache.has("k1", CacheCategory::Audio, None).await);
    for key in ["k0", "k2", "k3", "k4"] {
        assert!(fx.cache.has(key, CacheCategory::Audio, None).await, "{} evicted", key);
    }
    assert_eq!(fx.cache.get_stats().await.total_files, 4);
}

#[tokio::test]
async fn test_eviction_never_removes_the_entry_just_written() {
    let fx = Fixture::new(CacheConfig::default().with_max_entries(4)).await;

    // Same millisecond for every write, and "a" sorts before the others
    for key in ["b", "c", "d", "e", "a"] {
        assert!(fx.cache.set(key, &profile(key), CacheCategory::UserData, None, None).await);
    }

    let stored: Option<Profile> = fx.cache.get("a", CacheCategory::UserData, None).await;
    assert_eq!(stored, Some(profile("a")));
    assert!(!fx.cache.has("b", CacheCategory::UserData, None).await);
    assert!(fx.cache.get_stats().await.total_files <= 4);
}

#[tokio::test]
async fn test_invalid_owner_id_is_rejected() {
    let fx = Fixture::new(CacheConfig::default()).await;

    for owner in ["B_user_A", ""] {
        let stored = fx
            .cache
            .set("profile", &profile("x"), CacheCategory::UserData, None, Some(owner))
            .await;
        assert!(!stored, "owner {:?} accepted", owner);
    }
    assert!(fx.cache.images().cache_image(IMAGE_URL, Some("B_user_A")).await.is_none());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
    assert_eq!(fx.downloader.calls(), 0);
}

#[tokio::test]
async fn test_size_ceiling_triggers_eviction() {
    let fx = Fixture::new(CacheConfig::default().with_max_size(600)).await;
    let blob = "x".repeat(150);

    for i in 0..3 {
        fx.cache.set(&format!("b{}", i), &blob, CacheCategory::Audio, None, None).await;
        fx.tick();
    }

    let stats = fx.cache.get_stats().await;
    assert_eq!(stats.total_files, 2);
    assert!(!fx.cache.has("b0", CacheCategory::Audio, None).await);
}

#[tokio::test]
async fn test_evicted_image_record_deletes_file() {
    let fx = Fixture::new(CacheConfig::default().with_max_entries(1)).await;

    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();
    assert!(path.exists());
    fx.tick();

    fx.cache.set("k", &1, CacheCategory::Audio, None, None).await;

    assert!(!path.exists());
    assert!(fx.cache.has("k", CacheCategory::Audio, None).await);
}

// ============================================================================
// Clearing, statistics, events
// ============================================================================

#[tokio::test]
async fn test_clear_all_wipes_records_and_images() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache.set("a", &1, CacheCategory::Audio, None, Some("u1")).await;
    fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    assert_eq!(fx.cache.clear_all(None).await, 2);

    assert!(fx.image_dir().exists());
    assert!(fx.image_files().is_empty());
    let stats = fx.cache.get_stats().await;
    assert_eq!(stats.total_files, 0);
    assert_eq!(stats.total_size, 0);
}

#[tokio::test]
async fn test_stats_track_sizes_and_hit_rate() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache.set("a", &profile("a"), CacheCategory::UserData, None, None).await;
    fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    let _: Option<Profile> = fx.cache.get("a", CacheCategory::UserData, None).await;
    let _: Option<Profile> = fx.cache.get("missing", CacheCategory::UserData, None).await;

    let stats = fx.cache.get_stats().await;
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(
        stats.per_category_size[&CacheCategory::Images],
        b"\x89PNG fake image bytes".len() as u64
    );
    assert_eq!(
        stats.total_size,
        stats.per_category_size.values().sum::<u64>()
    );

    // Cached scan, live counters
    let _: Option<Profile> = fx.cache.get("a", CacheCategory::UserData, None).await;
    assert_eq!(fx.cache.get_stats().await.hits, 2);
}

#[tokio::test]
async fn test_clear_emits_event() {
    let root = std::env::temp_dir().join(format!("core-cache-test-{}", Uuid::new_v4()));
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();

    let cache = CacheCoordinator::new(
        Arc::new(SqliteKeyValueStore::in_memory().await.unwrap()),
        Arc::new(TokioFileSystem::with_cache_directory(root.clone())),
        Arc::new(TestDownloader::new(b"x")),
        Arc::new(ManualClock::starting_now()),
        CacheConfig::default(),
    )
    .with_event_bus(bus);
    cache.initialize().await.unwrap();

    cache.set("a", &1, CacheCategory::Audio, None, Some("u1")).await;
    assert_eq!(cache.clear_all(Some("u1")).await, 1);

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        CoreEvent::Cache(CacheEvent::Cleared {
            owner_id: Some("u1".to_string()),
            removed: 1,
        })
    );

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn test_operations_before_initialize_are_inert() {
    let root = std::env::temp_dir().join(format!("core-cache-test-{}", Uuid::new_v4()));
    let cache = CacheCoordinator::new(
        Arc::new(SqliteKeyValueStore::in_memory().await.unwrap()),
        Arc::new(TokioFileSystem::with_cache_directory(root)),
        Arc::new(TestDownloader::new(b"x")),
        Arc::new(ManualClock::starting_now()),
        CacheConfig::default(),
    );

    assert!(!cache.set("a", &1, CacheCategory::Audio, None, None).await);
    let value: Option<i32> = cache.get("a", CacheCategory::Audio, None).await;
    assert_eq!(value, None);
    assert!(cache.images().cache_image(IMAGE_URL, None).await.is_none());
    assert!(matches!(cache.run_cleanup().await, Err(CacheError::NotInitialized)));
    assert!(matches!(cache.start_cleanup(), Err(CacheError::NotInitialized)));
}

#[tokio::test]
async fn test_invalid_config_fails_initialize() {
    let root = std::env::temp_dir().join(format!("core-cache-test-{}", Uuid::new_v4()));
    let cache = CacheCoordinator::new(
        Arc::new(SqliteKeyValueStore::in_memory().await.unwrap()),
        Arc::new(TokioFileSystem::with_cache_directory(root)),
        Arc::new(TestDownloader::new(b"x")),
        Arc::new(ManualClock::starting_now()),
        CacheConfig::default().with_eviction_percent(0),
    );

    assert!(matches!(cache.initialize().await, Err(CacheError::InvalidConfig(_))));
    assert!(!cache.is_initialized());
}

// ============================================================================
// Images
// ============================================================================

#[tokio::test]
async fn test_cache_image_downloads_once() {
    let fx = Fixture::new(CacheConfig::default()).await;

    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();
    assert_eq!(path, fx.image_dir().join(image_filename_for_url(IMAGE_URL)));
    assert!(path.to_string_lossy().ends_with(".png"));
    assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG fake image bytes");

    let again = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();
    assert_eq!(again, path);
    assert_eq!(fx.downloader.calls(), 1);

    assert_eq!(fx.cache.images().get_cached_image(IMAGE_URL, None).await, Some(path));
}

#[tokio::test]
async fn test_truncated_image_is_purged() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    std::fs::write(&path, b"abc").unwrap();

    assert_eq!(fx.cache.images().get_cached_image(IMAGE_URL, None).await, None);
    assert!(!path.exists());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_zero_length_image_is_purged() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    std::fs::File::create(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    assert_eq!(fx.cache.images().get_cached_image(IMAGE_URL, None).await, None);
    assert!(!path.exists());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_oversize_image_is_not_cached() {
    let fx = Fixture::new(CacheConfig::default().with_max_size(50)).await;
    *fx.downloader.body.lock() = vec![7u8; 100];

    assert!(fx.cache.images().cache_image(IMAGE_URL, None).await.is_none());
    assert!(fx.image_files().is_empty());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_new_image_survives_the_eviction_it_triggers() {
    let fx = Fixture::new(CacheConfig::default().with_max_entries(1)).await;
    fx.cache.set("a", &profile("a"), CacheCategory::UserData, None, None).await;

    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    assert!(path.exists());
    assert!(!fx.cache.has("a", CacheCategory::UserData, None).await);
    assert_eq!(fx.cache.images().get_cached_image(IMAGE_URL, None).await, Some(path));
}

#[tokio::test]
async fn test_expired_image_is_purged() {
    let fx = Fixture::new(CacheConfig::default().with_image_ttl(Duration::from_secs(60))).await;
    let path = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    fx.clock.advance(Duration::from_secs(61));

    assert_eq!(fx.cache.images().get_cached_image(IMAGE_URL, None).await, None);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_failed_download_leaves_nothing() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.downloader.fail.store(true, Ordering::SeqCst);

    assert!(fx.cache.images().cache_image(IMAGE_URL, None).await.is_none());
    assert!(fx.image_files().is_empty());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_empty_download_leaves_nothing() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.downloader.body.lock().clear();

    assert!(fx.cache.images().cache_image(IMAGE_URL, None).await.is_none());
    assert!(fx.image_files().is_empty());
    assert_eq!(fx.cache.get_stats().await.total_files, 0);
}

#[tokio::test]
async fn test_orphan_file_is_adopted_on_read() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let path = fx.image_dir().join(image_filename_for_url(IMAGE_URL));
    std::fs::write(&path, b"already here").unwrap();

    assert_eq!(
        fx.cache.images().get_cached_image(IMAGE_URL, None).await,
        Some(path.clone())
    );
    let stats = fx.cache.get_stats().await;
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.total_size, b"already here".len() as u64);

    // Adopted record makes a download unnecessary
    fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();
    assert_eq!(fx.downloader.calls(), 0);
}

#[tokio::test]
async fn test_shared_image_survives_clearing_one_owner() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let path = fx.cache.images().cache_image(IMAGE_URL, Some("A")).await.unwrap();
    fx.cache.images().cache_image(IMAGE_URL, Some("B")).await.unwrap();

    assert_eq!(fx.cache.clear_all(Some("A")).await, 1);
    assert!(path.exists());
    assert_eq!(
        fx.cache.images().get_cached_image(IMAGE_URL, Some("B")).await,
        Some(path.clone())
    );

    assert_eq!(fx.cache.clear_all(Some("B")).await, 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_clean_orphaned_files() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let kept = fx.cache.images().cache_image(IMAGE_URL, None).await.unwrap();

    let stray = fx.image_dir().join(image_filename_for_url("https://x.test/stray.jpg"));
    std::fs::write(&stray, b"stray").unwrap();
    let in_flight = fx.image_dir().join("abc.jpg.1234.part");
    std::fs::write(&in_flight, b"downloading").unwrap();

    let other_url = "https://x.test/gone.gif";
    let gone = fx.cache.images().cache_image(other_url, Some("A")).await.unwrap();
    std::fs::remove_file(&gone).unwrap();

    assert_eq!(fx.cache.images().clean_orphaned_files(None).await, 2);

    assert!(kept.exists());
    assert!(!stray.exists());
    assert!(in_flight.exists());
    assert_eq!(fx.cache.get_stats().await.total_files, 1);
}

// ============================================================================
// Sweeper
// ============================================================================

#[tokio::test]
async fn test_cleanup_removes_only_expired_entries() {
    let fx = Fixture::new(CacheConfig::default()).await;
    fx.cache
        .set("short", &1, CacheCategory::Audio, Some(Duration::from_secs(1)), None)
        .await;
    fx.cache
        .set("refreshed", &1, CacheCategory::Audio, Some(Duration::from_secs(1)), None)
        .await;
    fx.cache
        .set("long", &1, CacheCategory::Audio, Some(Duration::from_secs(3600)), None)
        .await;

    fx.clock.advance(Duration::from_secs(2));
    fx.cache
        .set("refreshed", &2, CacheCategory::Audio, Some(Duration::from_secs(60)), None)
        .await;

    let report = fx.cache.run_cleanup().await.unwrap();

    assert_eq!(report.expired_removed, 1);
    assert_eq!(report.corrupt_removed, 0);
    assert!(fx.cache.has("long", CacheCategory::Audio, None).await);
    let refreshed: Option<i32> = fx.cache.get("refreshed", CacheCategory::Audio, None).await;
    assert_eq!(refreshed, Some(2));
    assert!(fx.cache.get_stats().await.last_cleanup.is_some());
}

#[tokio::test]
async fn test_cleanup_concurrent_with_writes_keeps_fresh_entries() {
    let fx = Arc::new(Fixture::new(CacheConfig::default()).await);
    for i in 0..20 {
        fx.cache
            .set(&format!("k{}", i), &i, CacheCategory::Audio, Some(Duration::from_secs(1)), None)
            .await;
    }
    fx.clock.advance(Duration::from_secs(2));

    let writer = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move {
            for i in 0..20 {
                fx.cache
                    .set(&format!("k{}", i), &i, CacheCategory::Audio, Some(Duration::from_secs(600)), None)
                    .await;
            }
        })
    };
    fx.cache.run_cleanup().await.unwrap();
    writer.await.unwrap();

    // Every key was rewritten fresh; none may be lost to the sweep
    for i in 0..20 {
        assert!(fx.cache.has(&format!("k{}", i), CacheCategory::Audio, None).await);
    }
}

#[tokio::test]
async fn test_orphan_files_survive_grace_period() {
    let fx = Fixture::new(CacheConfig::default()).await;
    let orphan = fx.image_dir().join(image_filename_for_url("https://x.test/o.png"));
    std::fs::write(&orphan, b"orphan").unwrap();

    let report = fx.cache.run_cleanup().await.unwrap();
    assert_eq!(report.images_removed, 0);
    assert!(orphan.exists());

    fx.clock.advance(Duration::from_secs(2 * 60 * 60));
    let report = fx.cache.run_cleanup().await.unwrap();
    assert_eq!(report.images_removed, 1);
    assert!(!orphan.exists());
}

#[tokio::test]
async fn test_periodic_cleanup_runs_and_stops() {
    let fx = Fixture::new(
        CacheConfig::default().with_cleanup_interval(Duration::from_millis(50)),
    )
    .await;
    fx.cache
        .set("short", &1, CacheCategory::Audio, Some(Duration::from_secs(1)), None)
        .await;
    fx.clock.advance(Duration::from_secs(2));

    fx.cache.start_cleanup().unwrap();
    fx.cache.start_cleanup().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    fx.cache.shutdown().await;

    let stats = fx.cache.get_stats().await;
    assert!(stats.last_cleanup.is_some());
    assert_eq!(stats.total_files, 0);
}
