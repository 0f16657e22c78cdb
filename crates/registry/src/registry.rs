//! Process-wide named cache registry with at-most-once provisioning.
//!
//! The registry holds one table per cache flavor. A cache is built on the
//! first request for its (name, flavor), stays alive for the process
//! lifetime, and is never rebuilt. Concurrent first requests for one name
//! observe exactly one build; requests for different names never block each
//! other.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use larder_registry::config::StaticConfig;
//! use larder_registry::registry::CacheRegistry;
//!
//! let config = StaticConfig::new().with("server.cache.users.maximum-size", 100);
//! let registry = Arc::new(CacheRegistry::new(Arc::new(config)));
//!
//! let users = registry.cache::<String, String>("users")?;
//! users.insert("42".to_string(), "jane".to_string());
//! # Ok::<(), larder_registry::error::CacheError>(())
//! ```

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::async_handle::AsyncLoadingCache;
use crate::config::ConfigSource;
use crate::error::{CacheError, CacheResult};
use crate::handle::{LoadingCache, NamedCache};
use crate::policy::CachePolicy;
use crate::provider::{AsyncCacheLoader, CacheWriter, NoopAsyncLoader, ProviderRegistry};

/// Default configuration key prefix for cache policies.
pub const DEFAULT_PREFIX: &str = "server.cache";

/// The three cache shapes the registry provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFlavor {
    /// Manually populated cache.
    Plain,
    /// Cache that materializes misses through a registered loader.
    Loading,
    /// Async counterpart of the loading flavor.
    AsyncLoading,
}

impl fmt::Display for CacheFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Loading => "loading",
            Self::AsyncLoading => "async-loading",
        })
    }
}

type RegistryEntry = Arc<dyn Any + Send + Sync>;
type FlavorTable = DashMap<String, Arc<OnceCell<RegistryEntry>>>;

/// Named cache registry.
///
/// Policies come from the [`ConfigSource`] under `<prefix>.<name>.*`;
/// capabilities come from the [`ProviderRegistry`]. Both are consulted once
/// per cache, at build time.
pub struct CacheRegistry {
    config: Arc<dyn ConfigSource>,
    providers: ProviderRegistry,
    prefix: String,
    plain: FlavorTable,
    loading: FlavorTable,
    async_loading: FlavorTable,
}

impl CacheRegistry {
    /// Create a registry reading policies under [`DEFAULT_PREFIX`].
    #[must_use]
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self::with_prefix(config, DEFAULT_PREFIX)
    }

    /// Create a registry reading policies under a custom prefix.
    #[must_use]
    pub fn with_prefix(config: Arc<dyn ConfigSource>, prefix: impl Into<String>) -> Self {
        Self {
            config,
            providers: ProviderRegistry::new(),
            prefix: prefix.into(),
            plain: FlavorTable::default(),
            loading: FlavorTable::default(),
            async_loading: FlavorTable::default(),
        }
    }

    /// The capability provider table consulted at build time.
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Configuration key prefix for cache policies.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get or build the plain cache named `name`.
    ///
    /// # Errors
    /// Configuration errors from the policy reader, [`CacheError::EmptyName`]
    /// for nameless requests, and [`CacheError::TypeMismatch`] when the cache
    /// exists at other key/value types.
    pub fn cache<K, V>(&self, name: &str) -> CacheResult<NamedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_build(CacheFlavor::Plain, &self.plain, name, || {
            self.build_plain::<K, V>(name)
        })
    }

    /// Get or build the loading cache named `name`.
    ///
    /// # Errors
    /// Everything [`Self::cache`] reports, plus [`CacheError::MissingLoader`]
    /// when no loader is registered for the name: a loading cache without a
    /// loader is a deployment bug, not a degraded mode.
    pub fn loading_cache<K, V>(&self, name: &str) -> CacheResult<LoadingCache<K, V>>
    where
        K: Clone + Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_build(CacheFlavor::Loading, &self.loading, name, || {
            self.build_loading::<K, V>(name)
        })
    }

    /// Get or build the async loading cache named `name`.
    ///
    /// A missing async loader is not fatal: the cache is built with a no-op
    /// loader that resolves every key to absent, and a warning is logged.
    ///
    /// # Errors
    /// Same as [`Self::cache`].
    pub fn async_cache<K, V>(&self, name: &str) -> CacheResult<AsyncLoadingCache<K, V>>
    where
        K: Clone + Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_build(CacheFlavor::AsyncLoading, &self.async_loading, name, || {
            self.build_async::<K, V>(name)
        })
    }

    /// Single-flight get-or-build against one flavor table.
    ///
    /// The per-name cell is fetched under a short shard lock and initialized
    /// outside it, so a slow build only blocks callers of the same name. A
    /// failed build leaves the cell empty and later callers retry.
    fn get_or_build<H, F>(
        &self,
        flavor: CacheFlavor,
        table: &FlavorTable,
        name: &str,
        build: F,
    ) -> CacheResult<H>
    where
        H: Clone + Send + Sync + 'static,
        F: FnOnce() -> CacheResult<H>,
    {
        if name.is_empty() {
            return Err(CacheError::EmptyName);
        }
        let cell = {
            let entry = table.entry(name.to_string()).or_default();
            Arc::clone(entry.value())
        };
        let built =
            cell.get_or_try_init(|| build().map(|handle| Arc::new(handle) as RegistryEntry))?;
        built
            .downcast_ref::<H>()
            .cloned()
            .ok_or_else(|| CacheError::TypeMismatch { name: name.to_string(), flavor })
    }

    fn build_plain<K, V>(&self, name: &str) -> CacheResult<NamedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let policy = CachePolicy::from_source(self.config.as_ref(), &self.prefix, name)?;
        let writer = self.writer_for::<K, V>(name)?;
        log_creation(name, CacheFlavor::Plain, &policy);
        Ok(NamedCache::build(name, &policy, writer))
    }

    fn build_loading<K, V>(&self, name: &str) -> CacheResult<LoadingCache<K, V>>
    where
        K: Clone + Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let policy = CachePolicy::from_source(self.config.as_ref(), &self.prefix, name)?;
        let writer = self.writer_for::<K, V>(name)?;
        let loader = self
            .providers
            .loader::<K, V>(name)?
            .ok_or_else(|| CacheError::MissingLoader { name: name.to_string() })?;
        log_creation(name, CacheFlavor::Loading, &policy);
        Ok(LoadingCache::build(name, &policy, writer, loader))
    }

    fn build_async<K, V>(&self, name: &str) -> CacheResult<AsyncLoadingCache<K, V>>
    where
        K: Clone + Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let policy = CachePolicy::from_source(self.config.as_ref(), &self.prefix, name)?;
        let writer = self.writer_for::<K, V>(name)?;
        let loader: Arc<dyn AsyncCacheLoader<K, V>> =
            match self.providers.async_loader::<K, V>(name)? {
                Some(loader) => loader,
                None => {
                    warn!(
                        cache = %name,
                        "no async cache loader registered; every key will resolve to absent"
                    );
                    Arc::new(NoopAsyncLoader)
                }
            };
        log_creation(name, CacheFlavor::AsyncLoading, &policy);
        Ok(AsyncLoadingCache::build(name, &policy, writer, loader))
    }

    fn writer_for<K, V>(&self, name: &str) -> CacheResult<Option<Arc<dyn CacheWriter<K, V>>>>
    where
        K: 'static,
        V: 'static,
    {
        let writer = self.providers.writer::<K, V>(name)?;
        if writer.is_some() {
            debug!(cache = %name, "cache writer attached");
        } else {
            warn!(cache = %name, "no cache writer registered; write-through disabled");
        }
        Ok(writer)
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("prefix", &self.prefix)
            .field("plain", &self.plain.len())
            .field("loading", &self.loading.len())
            .field("async_loading", &self.async_loading.len())
            .finish()
    }
}

fn log_creation(name: &str, flavor: CacheFlavor, policy: &CachePolicy) {
    info!(
        cache = %name,
        flavor = %flavor,
        max_entries = ?policy.max_entries,
        max_weight = ?policy.max_weight,
        time_to_idle = ?policy.time_to_idle,
        time_to_live = ?policy.time_to_live,
        "creating cache"
    );
}
