//! Error types for the cache registry.
//!
//! Configuration problems surface loudly at build time. Absent optional
//! capabilities (writers, async loaders) are warnings handled by the
//! registry, not errors.

use std::sync::Arc;

use thiserror::Error;

use crate::provider::ProviderKind;
use crate::registry::CacheFlavor;

/// Boxed error type accepted from loader and writer implementations.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while building or operating registry caches.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cache was requested without a name.
    #[error("cache name must not be empty")]
    EmptyName,

    /// A configuration key held a value the policy reader cannot use.
    #[error("invalid cache configuration at '{key}': {reason}")]
    InvalidConfig {
        /// Full configuration key that held the offending value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration document failed to parse.
    #[error("configuration document is not valid TOML: {0}")]
    InvalidDocument(String),

    /// A loading cache was built without a registered loader.
    #[error("no cache loader registered for loading cache '{name}'")]
    MissingLoader {
        /// Name of the cache that required a loader.
        name: String,
    },

    /// The registry already holds this cache at different key/value types.
    #[error("cache '{name}' ({flavor}) is already registered with different key/value types")]
    TypeMismatch {
        /// Name of the conflicting cache.
        name: String,
        /// Flavor table the conflict was found in.
        flavor: CacheFlavor,
    },

    /// A capability provider was registered at key/value types other than
    /// the ones requested.
    #[error("{kind} '{name}' is registered with different key/value types")]
    ProviderTypeMismatch {
        /// Name the provider was registered under.
        name: String,
        /// Capability kind of the provider.
        kind: ProviderKind,
    },

    /// The loader for a cache failed while materializing a value.
    ///
    /// The source is shared: every caller waiting on the same load observes
    /// the same underlying error.
    #[error("loader for cache '{name}' failed: {source}")]
    Load {
        /// Name of the cache whose loader failed.
        name: String,
        /// The loader's error.
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Convenience result alias for registry operations.
pub type CacheResult<T> = Result<T, CacheError>;
