//! Pluggable cache capabilities and their registration table.
//!
//! Caches gain behavior through three optional capability kinds, registered
//! by name before the cache is first built:
//!
//! - [`CacheLoader`]: materializes values for loading caches.
//! - [`AsyncCacheLoader`]: the asynchronous counterpart.
//! - [`CacheWriter`]: a write-through hook observing puts and removals.
//!
//! Resolution is an exact match on (capability kind, cache name). Providers
//! registered after the cache was built do not retrofit onto it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::error::{BoxedError, CacheError, CacheResult};

/// Why an entry left a cache. Mirrors the engine's removal causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// The entry was invalidated by a caller.
    Explicit,
    /// The entry was replaced by a newer value.
    Replaced,
    /// The entry outlived its time-to-live or time-to-idle.
    Expired,
    /// The entry was evicted to honor the capacity bound.
    Size,
}

impl RemovalCause {
    /// True when the policy removed the entry (expiry or capacity), false
    /// for caller-driven removals.
    #[must_use]
    pub fn was_evicted(self) -> bool {
        matches!(self, Self::Expired | Self::Size)
    }

    pub(crate) fn from_engine(cause: moka::notification::RemovalCause) -> Self {
        match cause {
            moka::notification::RemovalCause::Explicit => Self::Explicit,
            moka::notification::RemovalCause::Replaced => Self::Replaced,
            moka::notification::RemovalCause::Expired => Self::Expired,
            moka::notification::RemovalCause::Size => Self::Size,
        }
    }
}

/// Materializes values for a loading cache.
pub trait CacheLoader<K, V>: Send + Sync {
    /// Load the value for `key`. `Ok(None)` means the key has no value;
    /// absent results are returned to the caller and never cached.
    ///
    /// # Errors
    /// Loader errors propagate to every caller waiting on this key.
    fn load(&self, key: &K) -> Result<Option<V>, BoxedError>;
}

impl<K, V> fmt::Debug for dyn CacheLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn CacheLoader")
    }
}

/// Materializes values for an async loading cache.
#[async_trait]
pub trait AsyncCacheLoader<K, V>: Send + Sync {
    /// Load the value for `key`. Same contract as [`CacheLoader::load`].
    ///
    /// # Errors
    /// Loader errors propagate to every caller waiting on this key.
    async fn load(&self, key: &K) -> Result<Option<V>, BoxedError>;
}

/// Write-through hook attached to a cache.
///
/// `write` runs before every explicit insert. `delete` observes removals
/// with their cause; replaced entries are not reported since the replacing
/// insert already wrote the new value.
pub trait CacheWriter<K, V>: Send + Sync {
    /// Mirror a value about to be stored under `key`.
    fn write(&self, key: &K, value: &V);

    /// Observe the removal of `key`. The value is present when the engine
    /// still held it at removal time.
    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause);
}

/// Substitute loader for async caches without a registered one: resolves
/// every key to absent and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAsyncLoader;

#[async_trait]
impl<K, V> AsyncCacheLoader<K, V> for NoopAsyncLoader
where
    K: Sync,
    V: Send,
{
    async fn load(&self, _key: &K) -> Result<Option<V>, BoxedError> {
        Ok(None)
    }
}

/// Capability kind a provider is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Synchronous loader.
    Loader,
    /// Asynchronous loader.
    AsyncLoader,
    /// Write-through hook.
    Writer,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loader => "cache loader",
            Self::AsyncLoader => "async cache loader",
            Self::Writer => "cache writer",
        })
    }
}

/// Named provider table the registry resolves capabilities from.
///
/// Providers are stored type-erased and downcast at resolution; asking for a
/// provider at key/value types other than the registered ones is a
/// [`CacheError::ProviderTypeMismatch`]. Registering twice under the same
/// (kind, name) replaces the earlier provider and logs a warning.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<(ProviderKind, String), Box<dyn Any + Send + Sync>>,
}

impl ProviderRegistry {
    /// Create an empty provider table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous loader for the cache named `name`.
    pub fn register_loader<K, V>(&self, name: impl Into<String>, loader: Arc<dyn CacheLoader<K, V>>)
    where
        K: 'static,
        V: 'static,
    {
        self.register(ProviderKind::Loader, name.into(), Box::new(loader));
    }

    /// Register an asynchronous loader for the cache named `name`.
    pub fn register_async_loader<K, V>(
        &self,
        name: impl Into<String>,
        loader: Arc<dyn AsyncCacheLoader<K, V>>,
    ) where
        K: 'static,
        V: 'static,
    {
        self.register(ProviderKind::AsyncLoader, name.into(), Box::new(loader));
    }

    /// Register a write-through hook for the cache named `name`.
    pub fn register_writer<K, V>(&self, name: impl Into<String>, writer: Arc<dyn CacheWriter<K, V>>)
    where
        K: 'static,
        V: 'static,
    {
        self.register(ProviderKind::Writer, name.into(), Box::new(writer));
    }

    fn register(&self, kind: ProviderKind, name: String, provider: Box<dyn Any + Send + Sync>) {
        if self.providers.insert((kind, name.clone()), provider).is_some() {
            warn!(cache = %name, kind = %kind, "replacing previously registered provider");
        }
    }

    pub(crate) fn loader<K, V>(&self, name: &str) -> CacheResult<Option<Arc<dyn CacheLoader<K, V>>>>
    where
        K: 'static,
        V: 'static,
    {
        self.resolve(ProviderKind::Loader, name)
    }

    pub(crate) fn async_loader<K, V>(
        &self,
        name: &str,
    ) -> CacheResult<Option<Arc<dyn AsyncCacheLoader<K, V>>>>
    where
        K: 'static,
        V: 'static,
    {
        self.resolve(ProviderKind::AsyncLoader, name)
    }

    pub(crate) fn writer<K, V>(&self, name: &str) -> CacheResult<Option<Arc<dyn CacheWriter<K, V>>>>
    where
        K: 'static,
        V: 'static,
    {
        self.resolve(ProviderKind::Writer, name)
    }

    fn resolve<P>(&self, kind: ProviderKind, name: &str) -> CacheResult<Option<P>>
    where
        P: Clone + 'static,
    {
        let Some(entry) = self.providers.get(&(kind, name.to_string())) else {
            return Ok(None);
        };
        match entry.value().downcast_ref::<P>() {
            Some(provider) => Ok(Some(provider.clone())),
            None => Err(CacheError::ProviderTypeMismatch { name: name.to_string(), kind }),
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.providers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DoublingLoader;

    impl CacheLoader<String, u64> for DoublingLoader {
        fn load(&self, key: &String) -> Result<Option<u64>, BoxedError> {
            Ok(key.parse::<u64>().ok().map(|n| n * 2))
        }
    }

    #[test]
    fn test_resolves_registered_loader_by_exact_name() {
        let providers = ProviderRegistry::new();
        providers.register_loader::<String, u64>("numbers", Arc::new(DoublingLoader));

        let loader = providers.loader::<String, u64>("numbers").unwrap();
        assert!(loader.is_some());
        assert!(providers.loader::<String, u64>("number").unwrap().is_none());
        assert!(providers.loader::<String, u64>("numbers-2").unwrap().is_none());
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let providers = ProviderRegistry::new();
        providers.register_loader::<String, u64>("numbers", Arc::new(DoublingLoader));

        assert!(providers.async_loader::<String, u64>("numbers").unwrap().is_none());
        assert!(providers.writer::<String, u64>("numbers").unwrap().is_none());
    }

    #[test]
    fn test_wrong_types_are_a_mismatch() {
        let providers = ProviderRegistry::new();
        providers.register_loader::<String, u64>("numbers", Arc::new(DoublingLoader));

        let error = providers.loader::<String, String>("numbers").unwrap_err();
        assert!(matches!(
            error,
            CacheError::ProviderTypeMismatch { kind: ProviderKind::Loader, .. }
        ));
    }

    #[test]
    fn test_reregistration_replaces_the_provider() {
        struct FixedLoader(u64);

        impl CacheLoader<String, u64> for FixedLoader {
            fn load(&self, _key: &String) -> Result<Option<u64>, BoxedError> {
                Ok(Some(self.0))
            }
        }

        let providers = ProviderRegistry::new();
        providers.register_loader::<String, u64>("numbers", Arc::new(FixedLoader(1)));
        providers.register_loader::<String, u64>("numbers", Arc::new(FixedLoader(2)));

        let loader = providers.loader::<String, u64>("numbers").unwrap().unwrap();
        assert_eq!(loader.load(&"anything".to_string()).unwrap(), Some(2));
    }

    #[test]
    fn test_removal_cause_eviction_classification() {
        assert!(RemovalCause::Expired.was_evicted());
        assert!(RemovalCause::Size.was_evicted());
        assert!(!RemovalCause::Explicit.was_evicted());
        assert!(!RemovalCause::Replaced.was_evicted());
    }

    #[tokio::test]
    async fn test_noop_async_loader_resolves_absent() {
        let loader = NoopAsyncLoader;
        let value: Option<u64> =
            AsyncCacheLoader::<String, u64>::load(&loader, &"57".to_string()).await.unwrap();
        assert_eq!(value, None);
    }
}
