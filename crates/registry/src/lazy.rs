//! Lazy cache handles.
//!
//! A lazy handle names a cache without touching the registry: construction
//! reads no configuration, resolves no providers, and builds nothing. The
//! first operation resolves the underlying cache through
//! [`CacheRegistry`] and memoizes it, so the registry cost is paid once
//! per handle and only if the handle is ever used. Handles racing on their
//! first operation still observe a single build per name.
//!
//! Handles are cheap to create but deliberately not [`Clone`]: share the
//! handle itself behind an [`Arc`], or create another handle for the same
//! name and let the registry deduplicate.

use std::hash::Hash;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::async_handle::AsyncLoadingCache;
use crate::error::CacheResult;
use crate::handle::{CacheStats, LoadingCache, NamedCache};
use crate::registry::CacheRegistry;

/// Lazy handle on a plain named cache.
pub struct LazyCache<K, V> {
    registry: Arc<CacheRegistry>,
    name: String,
    cell: OnceCell<NamedCache<K, V>>,
}

impl<K, V> LazyCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a handle for the cache named `name` without resolving it.
    #[must_use]
    pub fn new(registry: Arc<CacheRegistry>, name: impl Into<String>) -> Self {
        Self { registry, name: name.into(), cell: OnceCell::new() }
    }

    /// Name of the cache this handle resolves to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolved(&self) -> CacheResult<&NamedCache<K, V>> {
        self.cell.get_or_try_init(|| self.registry.cache::<K, V>(&self.name))
    }

    /// Look up a value, resolving the cache on first use.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn get<Q>(&self, key: &Q) -> CacheResult<Option<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.resolved()?.get(key))
    }

    /// Insert a value, resolving the cache on first use.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn insert(&self, key: K, value: V) -> CacheResult<()> {
        self.resolved()?.insert(key, value);
        Ok(())
    }

    /// Discard the entry for `key` if present.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn invalidate<Q>(&self, key: &Q) -> CacheResult<()>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.resolved()?.invalidate(key);
        Ok(())
    }

    /// Discard every entry.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn invalidate_all(&self) -> CacheResult<()> {
        self.resolved()?.invalidate_all();
        Ok(())
    }

    /// Whether an entry for `key` is present, without touching recency.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn contains_key<Q>(&self, key: &Q) -> CacheResult<bool>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.resolved()?.contains_key(key))
    }

    /// Settled entry count.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn entry_count(&self) -> CacheResult<u64> {
        Ok(self.resolved()?.entry_count())
    }

    /// Flush pending maintenance work on the underlying cache.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn run_pending_tasks(&self) -> CacheResult<()> {
        self.resolved()?.run_pending_tasks();
        Ok(())
    }

    /// Settled snapshot of cache usage.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.resolved()?.stats())
    }
}

impl<K, V> std::fmt::Debug for LazyCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCache")
            .field("name", &self.name)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

/// Lazy handle on a loading cache.
pub struct LazyLoadingCache<K, V> {
    registry: Arc<CacheRegistry>,
    name: String,
    cell: OnceCell<LoadingCache<K, V>>,
}

impl<K, V> LazyLoadingCache<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a handle for the loading cache named `name` without
    /// resolving it. A missing loader surfaces at the first operation,
    /// not here.
    #[must_use]
    pub fn new(registry: Arc<CacheRegistry>, name: impl Into<String>) -> Self {
        Self { registry, name: name.into(), cell: OnceCell::new() }
    }

    /// Name of the cache this handle resolves to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolved(&self) -> CacheResult<&LoadingCache<K, V>> {
        self.cell.get_or_try_init(|| self.registry.loading_cache::<K, V>(&self.name))
    }

    /// Look up `key`, loading it on a miss.
    ///
    /// # Errors
    /// Registry errors from a first-use resolution, and
    /// [`crate::error::CacheError::Load`] when the loader fails.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.resolved()?.get(key)
    }

    /// Look up `key` without invoking the loader.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn get_present<Q>(&self, key: &Q) -> CacheResult<Option<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.resolved()?.get_present(key))
    }

    /// Insert a value directly, bypassing the loader.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn insert(&self, key: K, value: V) -> CacheResult<()> {
        self.resolved()?.insert(key, value);
        Ok(())
    }

    /// Discard the entry for `key` if present.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn invalidate<Q>(&self, key: &Q) -> CacheResult<()>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.resolved()?.invalidate(key);
        Ok(())
    }

    /// Discard every entry.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn invalidate_all(&self) -> CacheResult<()> {
        self.resolved()?.invalidate_all();
        Ok(())
    }

    /// Whether an entry for `key` is present, without loading.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn contains_key<Q>(&self, key: &Q) -> CacheResult<bool>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.resolved()?.contains_key(key))
    }

    /// Settled entry count.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn entry_count(&self) -> CacheResult<u64> {
        Ok(self.resolved()?.entry_count())
    }

    /// Flush pending maintenance work on the underlying cache.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn run_pending_tasks(&self) -> CacheResult<()> {
        self.resolved()?.run_pending_tasks();
        Ok(())
    }

    /// Settled snapshot of cache usage.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.resolved()?.stats())
    }
}

impl<K, V> std::fmt::Debug for LazyLoadingCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyLoadingCache")
            .field("name", &self.name)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

/// Lazy handle on an async loading cache.
///
/// Resolution itself is synchronous and cheap: building a cache allocates
/// and reads configuration, it never performs IO.
pub struct LazyAsyncLoadingCache<K, V> {
    registry: Arc<CacheRegistry>,
    name: String,
    cell: OnceCell<AsyncLoadingCache<K, V>>,
}

impl<K, V> LazyAsyncLoadingCache<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a handle for the async loading cache named `name` without
    /// resolving it.
    #[must_use]
    pub fn new(registry: Arc<CacheRegistry>, name: impl Into<String>) -> Self {
        Self { registry, name: name.into(), cell: OnceCell::new() }
    }

    /// Name of the cache this handle resolves to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolved(&self) -> CacheResult<&AsyncLoadingCache<K, V>> {
        self.cell.get_or_try_init(|| self.registry.async_cache::<K, V>(&self.name))
    }

    /// Look up `key`, loading it on a miss.
    ///
    /// # Errors
    /// Registry errors from a first-use resolution, and
    /// [`crate::error::CacheError::Load`] when the loader fails.
    pub async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.resolved()?.get(key).await
    }

    /// Look up `key` without invoking the loader.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn get_present<Q>(&self, key: &Q) -> CacheResult<Option<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized + Sync,
    {
        Ok(self.resolved()?.get_present(key).await)
    }

    /// Insert a value directly, bypassing the loader.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn insert(&self, key: K, value: V) -> CacheResult<()> {
        self.resolved()?.insert(key, value).await;
        Ok(())
    }

    /// Discard the entry for `key` if present.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn invalidate<Q>(&self, key: &Q) -> CacheResult<()>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized + Sync,
    {
        self.resolved()?.invalidate(key).await;
        Ok(())
    }

    /// Discard every entry.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn invalidate_all(&self) -> CacheResult<()> {
        self.resolved()?.invalidate_all();
        Ok(())
    }

    /// Whether an entry for `key` is present, without loading.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub fn contains_key<Q>(&self, key: &Q) -> CacheResult<bool>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.resolved()?.contains_key(key))
    }

    /// Settled entry count.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn entry_count(&self) -> CacheResult<u64> {
        Ok(self.resolved()?.entry_count().await)
    }

    /// Flush pending maintenance work on the underlying cache.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn run_pending_tasks(&self) -> CacheResult<()> {
        self.resolved()?.run_pending_tasks().await;
        Ok(())
    }

    /// Settled snapshot of cache usage.
    ///
    /// # Errors
    /// Any registry error from a first-use resolution.
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.resolved()?.stats().await)
    }
}

impl<K, V> std::fmt::Debug for LazyAsyncLoadingCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyAsyncLoadingCache")
            .field("name", &self.name)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::error::{BoxedError, CacheError};
    use crate::provider::CacheLoader;

    struct DoublingLoader;

    impl CacheLoader<String, u64> for DoublingLoader {
        fn load(&self, key: &String) -> Result<Option<u64>, BoxedError> {
            Ok(key.parse::<u64>().ok().map(|n| n * 2))
        }
    }

    fn shared_registry(config: StaticConfig) -> Arc<CacheRegistry> {
        Arc::new(CacheRegistry::new(Arc::new(config)))
    }

    #[test]
    fn test_construction_reads_no_configuration() {
        let config = Arc::new(StaticConfig::new().with("server.cache.idle.maximum-size", 10));
        let registry = Arc::new(CacheRegistry::new(
            Arc::clone(&config) as Arc<dyn crate::config::ConfigSource>
        ));

        let handle = LazyCache::<String, u64>::new(registry, "idle");
        assert_eq!(config.read_count(), 0);

        handle.insert("k".to_string(), 1).unwrap();
        assert!(config.read_count() > 0);
    }

    #[test]
    fn test_handles_for_one_name_share_the_cache() {
        let registry = shared_registry(StaticConfig::new());
        let writer_side = LazyCache::<String, u64>::new(Arc::clone(&registry), "shared");
        let reader_side = LazyCache::<String, u64>::new(registry, "shared");

        writer_side.insert("k".to_string(), 7).unwrap();
        assert_eq!(reader_side.get("k").unwrap(), Some(7));
    }

    #[test]
    fn test_missing_loader_surfaces_at_first_use() {
        let registry = shared_registry(StaticConfig::new());
        let handle = LazyLoadingCache::<String, u64>::new(registry, "unserved");

        let error = handle.get(&"1".to_string()).unwrap_err();
        assert!(matches!(error, CacheError::MissingLoader { ref name } if name == "unserved"));
    }

    #[test]
    fn test_loader_registered_after_handle_creation_is_honored() {
        let registry = shared_registry(StaticConfig::new());
        let handle = LazyLoadingCache::<String, u64>::new(Arc::clone(&registry), "late-bound");

        registry
            .providers()
            .register_loader::<String, u64>("late-bound", Arc::new(DoublingLoader));

        assert_eq!(handle.get(&"4".to_string()).unwrap(), Some(8));
    }

    #[tokio::test]
    async fn test_async_handle_defers_and_resolves() {
        let registry = shared_registry(StaticConfig::new());
        let handle = LazyAsyncLoadingCache::<String, u64>::new(registry, "deferred");

        handle.insert("k".to_string(), 3).await.unwrap();
        assert_eq!(handle.get_present("k").await.unwrap(), Some(3));
        assert_eq!(handle.get(&"missing".to_string()).await.unwrap(), None);
    }
}
