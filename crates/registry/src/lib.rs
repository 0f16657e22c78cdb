//! Named, lazily-provisioned cache registry.
//!
//! Caches are declared by name, tuned through configuration keys under
//! `server.cache.<name>.*`, and built at most once per name and flavor.
//! Three flavors exist: plain caches populated by hand, loading caches
//! that pull misses through a [`CacheLoader`], and async loading caches
//! that do the same through an [`AsyncCacheLoader`]. Every flavor can
//! mirror writes to an external store through a [`CacheWriter`].
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use larder_registry::{CacheRegistry, LazyCache, StaticConfig};
//!
//! let config = StaticConfig::new()
//!     .with("server.cache.users.maximum-size", 500)
//!     .with("server.cache.users.expiration.time-after-access", 30);
//! let registry = Arc::new(CacheRegistry::new(Arc::new(config)));
//!
//! // Handles are free to create; the cache is built on first use.
//! let users = LazyCache::<u64, String>::new(registry, "users");
//! users.insert(42, "jane".to_string())?;
//! assert_eq!(users.get(&42)?, Some("jane".to_string()));
//! # Ok::<(), larder_registry::CacheError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod async_handle;
pub mod config;
pub mod error;
pub mod handle;
pub mod lazy;
pub mod policy;
pub mod provider;
pub mod registry;

// Re-export the working surface so callers rarely need module paths
// ------------------------
pub use async_handle::AsyncLoadingCache;
pub use config::{ConfigSource, ConfigValue, StaticConfig, TomlConfig};
pub use error::{BoxedError, CacheError, CacheResult};
pub use handle::{CacheStats, LoadingCache, NamedCache};
pub use lazy::{LazyAsyncLoadingCache, LazyCache, LazyLoadingCache};
pub use policy::{CachePolicy, ExpirationUnit};
pub use provider::{
    AsyncCacheLoader, CacheLoader, CacheWriter, NoopAsyncLoader, ProviderKind, ProviderRegistry,
    RemovalCause,
};
pub use registry::{CacheFlavor, CacheRegistry, DEFAULT_PREFIX};
