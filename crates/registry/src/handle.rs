//! Built cache handles for the plain and loading flavors.
//!
//! Handles wrap the engine cache together with the capabilities resolved at
//! build time. They are cheap to clone; clones share the same underlying
//! cache and never re-enter the registry.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use moka::sync::Cache;

use crate::error::{CacheError, CacheResult};
use crate::policy::CachePolicy;
use crate::provider::{CacheLoader, CacheWriter, RemovalCause};

/// Point-in-time size snapshot of one cache.
///
/// Pending maintenance runs before the snapshot is taken, so the numbers
/// reflect evictions that were already due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live entries.
    pub entry_count: u64,
    /// Total weighted size; equals the entry count without a weigher.
    pub weighted_size: u64,
}

// Absent values ride the init error channel so the engine caches nothing for
// keys the loader reports missing.
#[derive(Debug)]
pub(crate) enum LoadAbort {
    Absent,
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

/// A named plain cache.
///
/// Writes go through the attached [`CacheWriter`] when one was registered
/// for the name: `insert` invokes the writer first, and removals reach the
/// writer's `delete` with their cause once the engine processes them.
pub struct NamedCache<K, V> {
    name: Arc<str>,
    cache: Cache<K, V>,
    writer: Option<Arc<dyn CacheWriter<K, V>>>,
}

impl<K, V> Clone for NamedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            cache: self.cache.clone(),
            writer: self.writer.clone(),
        }
    }
}

impl<K, V> fmt::Debug for NamedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCache").field("name", &self.name).finish()
    }
}

impl<K, V> NamedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn build(
        name: &str,
        policy: &CachePolicy,
        writer: Option<Arc<dyn CacheWriter<K, V>>>,
    ) -> Self {
        let mut builder = Cache::builder().name(name);
        builder = policy.configure_sync(name, builder);
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
        Self { name: Arc::from(name), cache: builder.build(), writer }
    }

    /// Name the cache was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a key without side effects beyond recency bookkeeping.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key)
    }

    /// Store a value, writing through first when a writer is attached.
    pub fn insert(&self, key: K, value: V) {
        if let Some(writer) = &self.writer {
            writer.write(&key, &value);
        }
        self.cache.insert(key, value);
    }

    /// Remove a key. The writer's `delete` observes the removal once the
    /// engine processes it.
    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.invalidate(key);
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
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Process the engine's pending maintenance tasks now.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    /// Snapshot the cache size.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            entry_count: self.cache.entry_count(),
            weighted_size: self.cache.weighted_size(),
        }
    }
}

/// A named loading cache: a [`NamedCache`] plus the loader resolved for it.
///
/// `get` materializes missing values through the loader with the engine's
/// per-key single flight, so concurrent readers of one key trigger a single
/// load.
pub struct LoadingCache<K, V> {
    inner: NamedCache<K, V>,
    loader: Arc<dyn CacheLoader<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), loader: Arc::clone(&self.loader) }
    }
}

impl<K, V> fmt::Debug for LoadingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache").field("name", &self.inner.name).finish()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn build(
        name: &str,
        policy: &CachePolicy,
        writer: Option<Arc<dyn CacheWriter<K, V>>>,
        loader: Arc<dyn CacheLoader<K, V>>,
    ) -> Self {
        Self { inner: NamedCache::build(name, policy, writer), loader }
    }

    /// Name the cache was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Get the value for `key`, loading it on a miss.
    ///
    /// Absent results (`Ok(None)` from the loader) are returned without
    /// caching, so later lookups ask the loader again.
    ///
    /// # Errors
    /// [`CacheError::Load`] when the loader fails; every caller waiting on
    /// the same key observes the same error.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        let loaded = self.inner.cache.try_get_with(key.clone(), || {
            match self.loader.load(key) {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Err(LoadAbort::Absent),
                Err(error) => Err(LoadAbort::Failed(Arc::from(error))),
            }
        });
        match loaded {
            Ok(value) => Ok(Some(value)),
            Err(abort) => match abort.as_ref() {
                LoadAbort::Absent => Ok(None),
                LoadAbort::Failed(source) => Err(CacheError::Load {
                    name: self.inner.name.to_string(),
                    source: Arc::clone(source),
                }),
            },
        }
    }

    /// Look up a key without loading.
    pub fn get_present<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    /// Store a value directly, bypassing the loader. Writes through like
    /// [`NamedCache::insert`].
    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    /// Remove a key.
    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.invalidate(key);
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Whether a live entry exists for `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    /// Number of live entries, after pending maintenance.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Process the engine's pending maintenance tasks now.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }

    /// Snapshot the cache size.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
