//! Async loading cache handle over the engine's future cache.
//!
//! The async flavor mirrors [`LoadingCache`](crate::handle::LoadingCache)
//! with awaitable operations. Caches built without a registered async loader
//! carry the no-op substitute, so every miss resolves to absent instead of
//! failing.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use moka::future::Cache;

use crate::error::{CacheError, CacheResult};
use crate::handle::{CacheStats, LoadAbort};
use crate::policy::CachePolicy;
use crate::provider::{AsyncCacheLoader, CacheWriter, RemovalCause};

/// A named async loading cache.
pub struct AsyncLoadingCache<K, V> {
    name: Arc<str>,
    cache: Cache<K, V>,
    writer: Option<Arc<dyn CacheWriter<K, V>>>,
    loader: Arc<dyn AsyncCacheLoader<K, V>>,
}

impl<K, V> Clone for AsyncLoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            cache: self.cache.clone(),
            writer: self.writer.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<K, V> AsyncLoadingCache<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn build(
        name: &str,
        policy: &CachePolicy,
        writer: Option<Arc<dyn CacheWriter<K, V>>>,
        loader: Arc<dyn AsyncCacheLoader<K, V>>,
    ) -> Self {
        let mut builder = Cache::builder().name(name);
        builder = policy.configure_future(name, builder);
        if let Some(writer) = &writer {
            let on_removal = Arc::clone(writer);
            builder = builder.eviction_listener(move |key: Arc<K>, value: V, cause| {
                let cause = RemovalCause::from_engine(cause);
                // The insert that replaced the entry already wrote the new value.
                if cause != RemovalCause::Replaced {
                    on_removal.delete(&key, Some(&value), cause);
                }
            });
        }
        Self { name: Arc::from(name), cache: builder.build(), writer, loader }
    }

    /// Name the cache was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the value for `key`, loading it on a miss.
    ///
    /// Absent results (`Ok(None)` from the loader) are returned without
    /// caching. Concurrent getters of one key share a single load.
    ///
    /// # Errors
    /// [`CacheError::Load`] when the loader fails; every caller waiting on
    /// the same key observes the same error.
    pub async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        let loaded = self
            .cache
            .try_get_with(key.clone(), async {
                match self.loader.load(key).await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(LoadAbort::Absent),
                    Err(error) => Err(LoadAbort::Failed(Arc::from(error))),
                }
            })
            .await;
        match loaded {
            Ok(value) => Ok(Some(value)),
            Err(abort) => match abort.as_ref() {
                LoadAbort::Absent => Ok(None),
                LoadAbort::Failed(source) => Err(CacheError::Load {
                    name: self.name.to_string(),
                    source: Arc::clone(source),
                }),
            },
        }
    }

    /// Look up a key without loading.
    pub async fn get_present<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key).await
    }

    /// Store a value directly, bypassing the loader. Writes through first
    /// when a writer is attached.
    pub async fn insert(&self, key: K, value: V) {
        if let Some(writer) = &self.writer {
            writer.write(&key, &value);
        }
        self.cache.insert(key, value).await;
    }

    /// Remove a key. The writer's `delete` observes the removal once the
    /// engine processes it.
    pub async fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.invalidate(key).await;
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Whether a live entry exists for `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.contains_key(key)
    }

    /// Number of live entries. Runs pending maintenance first so due
    /// evictions are reflected.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    /// Process the engine's pending maintenance tasks now.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Snapshot the cache size.
    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            entry_count: self.cache.entry_count(),
            weighted_size: self.cache.weighted_size(),
        }
    }
}
