//! Configuration source seam for cache policies.
//!
//! The registry reads cache policies through [`ConfigSource`], a minimal
//! dotted-path lookup over scalar values. Two implementations ship with the
//! crate: [`TomlConfig`] for deployments that configure caches from a TOML
//! document, and [`StaticConfig`] for tests and embedded setups.
//!
//! # Example
//! ```rust
//! use larder_registry::config::{ConfigSource, ConfigValue, StaticConfig};
//!
//! let config = StaticConfig::new().with("server.cache.users.maximum-size", 100);
//! assert_eq!(
//!     config.get("server.cache.users.maximum-size"),
//!     Some(ConfigValue::Integer(100))
//! );
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CacheError, CacheResult};

/// A raw scalar read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// An integer scalar.
    Integer(i64),
    /// A floating-point scalar.
    Float(f64),
    /// A boolean scalar.
    Boolean(bool),
    /// A string scalar.
    Text(String),
    /// A present but non-scalar value (array, table, datetime). Never
    /// coercible; carried so shape errors can show what was found.
    Structured(String),
}

impl ConfigValue {
    /// Human-readable shape name used in configuration error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "string",
            Self::Structured(_) => "structured value",
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Read access to deployment configuration by dotted path.
///
/// Paths are split on `.`, so cache names themselves must not contain dots.
/// Returning `None` means the key is absent, which the policy reader treats
/// as "setting not configured".
pub trait ConfigSource: Send + Sync {
    /// Look up the raw value at `path`.
    fn get(&self, path: &str) -> Option<ConfigValue>;
}

/// In-memory configuration backed by a flat map of dotted paths.
///
/// Reads are counted, which lets tests assert that lazy handles perform no
/// configuration access before their first operation.
#[derive(Debug, Default)]
pub struct StaticConfig {
    values: HashMap<String, ConfigValue>,
    reads: AtomicUsize,
}

impl StaticConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under a dotted path, consuming and returning the config.
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Number of `get` calls performed so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl ConfigSource for StaticConfig {
    fn get(&self, path: &str) -> Option<ConfigValue> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.values.get(path).cloned()
    }
}

/// Configuration backed by a parsed TOML document.
///
/// Dotted paths walk nested tables, so `server.cache.users.maximum-size`
/// resolves `[server.cache.users]` / `maximum-size = 100` as well as the
/// inline-dotted form.
#[derive(Debug, Clone)]
pub struct TomlConfig {
    root: toml::Value,
}

impl TomlConfig {
    /// Parse a TOML document into a configuration source.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidDocument`] when the document is not
    /// valid TOML.
    pub fn parse(document: &str) -> CacheResult<Self> {
        let root = document
            .parse::<toml::Value>()
            .map_err(|error| CacheError::InvalidDocument(error.to_string()))?;
        Ok(Self { root })
    }
}

impl ConfigSource for TomlConfig {
    fn get(&self, path: &str) -> Option<ConfigValue> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_table()?.get(segment)?;
        }
        Some(match current {
            toml::Value::Integer(value) => ConfigValue::Integer(*value),
            toml::Value::Float(value) => ConfigValue::Float(*value),
            toml::Value::Boolean(value) => ConfigValue::Boolean(*value),
            toml::Value::String(value) => ConfigValue::Text(value.clone()),
            other => ConfigValue::Structured(other.to_string()),
        })
    }
}
