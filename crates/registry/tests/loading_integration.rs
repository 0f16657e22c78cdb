//! Integration tests for loading and async loading caches
//!
//! Exercises loader-driven materialization, single-flight misses,
//! absent-key semantics, and the no-op substitute for unregistered
//! async loaders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;

use larder_registry::{
    AsyncCacheLoader, BoxedError, CacheError, CacheLoader, CacheRegistry, StaticConfig,
};

/// Loader fixture: resolves numeric keys to `key + offset`, fails on
/// "boom", reports everything else absent. Optionally dawdles to widen
/// race windows.
struct OffsetLoader {
    offset: u64,
    delay: Duration,
    calls: AtomicUsize,
}

impl OffsetLoader {
    fn new(offset: u64) -> Self {
        Self { offset, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    fn slow(offset: u64, delay: Duration) -> Self {
        Self { offset, delay, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CacheLoader<String, u64> for OffsetLoader {
    fn load(&self, key: &String) -> Result<Option<u64>, BoxedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if key == "boom" {
            return Err("backing store offline".into());
        }
        Ok(key.parse::<u64>().ok().map(|n| n + self.offset))
    }
}

/// Async twin of [`OffsetLoader`].
struct AsyncOffsetLoader {
    offset: u64,
    delay: Duration,
    calls: AtomicUsize,
}

impl AsyncOffsetLoader {
    fn new(offset: u64) -> Self {
        Self { offset, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    fn slow(offset: u64, delay: Duration) -> Self {
        Self { offset, delay, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncCacheLoader<String, u64> for AsyncOffsetLoader {
    async fn load(&self, key: &String) -> Result<Option<u64>, BoxedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if key == "boom" {
            return Err("backing store offline".into());
        }
        Ok(key.parse::<u64>().ok().map(|n| n + self.offset))
    }
}

fn registry() -> Arc<CacheRegistry> {
    Arc::new(CacheRegistry::new(Arc::new(StaticConfig::new())))
}

/// Verifies that misses run through the loader and hits do not.
///
/// # Test Steps
/// 1. Register a loader resolving "5" to 15
/// 2. First lookup loads and returns 15
/// 3. Second lookup hits the cache; the loader is not called again
#[test]
fn test_loader_materializes_misses() {
    let registry = registry();
    let loader = Arc::new(OffsetLoader::new(10));
    registry.providers().register_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.loading_cache::<String, u64>("numbers").unwrap();

    assert_eq!(cache.get(&"5".to_string()).unwrap(), Some(15));
    assert_eq!(cache.get(&"5".to_string()).unwrap(), Some(15));
    assert_eq!(loader.calls(), 1);
}

/// Verifies single-flight loading: concurrent misses on one key share a
/// single loader invocation.
///
/// # Test Steps
/// 1. Register a loader that sleeps 50ms per load
/// 2. Release 10 threads through a barrier, all requesting the same key
/// 3. Verify every thread got the value and the loader ran exactly once
#[test]
fn test_concurrent_misses_share_one_load() {
    let registry = registry();
    let loader = Arc::new(OffsetLoader::slow(10, Duration::from_millis(50)));
    registry.providers().register_loader::<String, u64>("numbers", loader.clone());

    let cache = Arc::new(registry.loading_cache::<String, u64>("numbers").unwrap());
    let barrier = Arc::new(Barrier::new(10));
    let mut handles = vec![];

    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            cache.get(&"7".to_string()).unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().expect("Thread should complete"), Some(17));
    }
    assert_eq!(loader.calls(), 1);
}

/// Verifies that absent results are returned but never cached: the next
/// lookup asks the loader again.
///
/// # Test Steps
/// 1. Look up a key the loader reports absent
/// 2. Look it up again
/// 3. Verify two loader calls and an empty cache
#[test]
fn test_absent_results_are_not_cached() {
    let registry = registry();
    let loader = Arc::new(OffsetLoader::new(10));
    registry.providers().register_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.loading_cache::<String, u64>("numbers").unwrap();

    assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
    assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
    assert_eq!(loader.calls(), 2);
    assert_eq!(cache.entry_count(), 0);
}

/// Verifies that loader failures surface as errors naming the cache.
///
/// # Test Steps
/// 1. Look up the key the loader fails on
/// 2. Verify the error carries the cache name
/// 3. Verify the failure was not cached; a retry calls the loader again
#[test]
fn test_loader_failure_is_reported_and_not_cached() {
    let registry = registry();
    let loader = Arc::new(OffsetLoader::new(10));
    registry.providers().register_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.loading_cache::<String, u64>("numbers").unwrap();

    let error = cache.get(&"boom".to_string()).unwrap_err();
    assert!(matches!(error, CacheError::Load { ref name, .. } if name == "numbers"));

    let _ = cache.get(&"boom".to_string());
    assert_eq!(loader.calls(), 2);
}

/// Verifies that direct inserts take precedence over the loader.
///
/// # Test Steps
/// 1. Insert a value for a key the loader could also resolve
/// 2. Verify the lookup returns the inserted value
/// 3. Verify the loader was never consulted
#[test]
fn test_inserted_values_bypass_the_loader() {
    let registry = registry();
    let loader = Arc::new(OffsetLoader::new(10));
    registry.providers().register_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.loading_cache::<String, u64>("numbers").unwrap();
    cache.insert("7".to_string(), 99);

    assert_eq!(cache.get(&"7".to_string()).unwrap(), Some(99));
    assert_eq!(loader.calls(), 0);
}

/// Verifies async loader materialization and hit behavior.
///
/// # Test Steps
/// 1. Register an async loader resolving "5" to 25
/// 2. First lookup loads, second hits
/// 3. Verify a single loader call
#[tokio::test(flavor = "multi_thread")]
async fn test_async_loader_materializes_misses() {
    let registry = registry();
    let loader = Arc::new(AsyncOffsetLoader::new(20));
    registry.providers().register_async_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.async_cache::<String, u64>("numbers").unwrap();

    assert_eq!(cache.get(&"5".to_string()).await.unwrap(), Some(25));
    assert_eq!(cache.get(&"5".to_string()).await.unwrap(), Some(25));
    assert_eq!(loader.calls(), 1);
}

/// Verifies single-flight loading for concurrent async misses.
///
/// # Test Steps
/// 1. Register an async loader that sleeps 50ms per load
/// 2. Await three concurrent lookups of the same key
/// 3. Verify all three resolved and the loader ran once
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_async_misses_share_one_load() {
    let registry = registry();
    let loader = Arc::new(AsyncOffsetLoader::slow(20, Duration::from_millis(50)));
    registry.providers().register_async_loader::<String, u64>("numbers", loader.clone());

    let cache = registry.async_cache::<String, u64>("numbers").unwrap();

    let key = "7".to_string();
    let (a, b, c) = tokio::join!(cache.get(&key), cache.get(&key), cache.get(&key));

    assert_eq!(a.unwrap(), Some(27));
    assert_eq!(b.unwrap(), Some(27));
    assert_eq!(c.unwrap(), Some(27));
    assert_eq!(loader.calls(), 1);
}

/// Verifies that an async cache built without a loader answers absent
/// for every key instead of failing.
///
/// # Test Steps
/// 1. Build an async cache with no registered loader
/// 2. Verify lookups resolve to absent
/// 3. Verify direct inserts still work and are readable
#[tokio::test(flavor = "multi_thread")]
async fn test_async_cache_without_loader_resolves_absent() {
    let registry = registry();
    let cache = registry.async_cache::<String, u64>("quiet").unwrap();

    assert_eq!(cache.get(&"anything".to_string()).await.unwrap(), None);
    assert_eq!(cache.get(&"else".to_string()).await.unwrap(), None);

    cache.insert("present".to_string(), 1).await;
    assert_eq!(cache.get(&"present".to_string()).await.unwrap(), Some(1));
}
