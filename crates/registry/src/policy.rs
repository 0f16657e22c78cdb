//! Cache policy resolution from declarative configuration.
//!
//! A cache named `users` under the prefix `server.cache` is configured by:
//!
//! ```toml
//! [server.cache.users]
//! maximum-size = 100
//! maximum-weight = 0
//!
//! [server.cache.users.expiration]
//! time-unit = "MINUTES"
//! time-after-access = 10
//! time-after-write = 60
//! ```
//!
//! Every setting is optional. Numeric settings accept an integer or a string
//! that parses as one; values of zero or less leave the setting unset. Any
//! other shape is a configuration error. Building a policy never constructs
//! a cache.

use std::time::Duration;

use tracing::warn;

use crate::config::{ConfigSource, ConfigValue};
use crate::error::{CacheError, CacheResult};

type SyncBuilder<K, V> = moka::sync::CacheBuilder<K, V, moka::sync::Cache<K, V>>;
type FutureBuilder<K, V> = moka::future::CacheBuilder<K, V, moka::future::Cache<K, V>>;

/// Unit applied to the `time-after-access` and `time-after-write` settings.
///
/// Parsed case-insensitively from the `expiration.time-unit` key; `Minutes`
/// when the key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpirationUnit {
    /// Nanoseconds.
    Nanoseconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    Seconds,
    /// Minutes (the default).
    #[default]
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl ExpirationUnit {
    /// Parse a unit name, case-insensitively. `None` for unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "NANOSECONDS" => Some(Self::Nanoseconds),
            "MICROSECONDS" => Some(Self::Microseconds),
            "MILLISECONDS" => Some(Self::Milliseconds),
            "SECONDS" => Some(Self::Seconds),
            "MINUTES" => Some(Self::Minutes),
            "HOURS" => Some(Self::Hours),
            "DAYS" => Some(Self::Days),
            _ => None,
        }
    }

    /// Convert an amount in this unit into a [`Duration`].
    #[must_use]
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

/// Resolved eviction policy for one named cache.
///
/// `None` means "not configured"; the engine keeps its unbounded default for
/// that dimension. The policy is read once, when the cache is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Upper bound on the number of entries.
    pub max_entries: Option<u64>,
    /// Upper bound on the total entry weight.
    pub max_weight: Option<u64>,
    /// Expire entries this long after the last read or write.
    pub time_to_idle: Option<Duration>,
    /// Expire entries this long after they were written.
    pub time_to_live: Option<Duration>,
}

impl CachePolicy {
    /// Read the policy for `name` from `source` under `prefix`.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfig`] when a key holds a value of the
    /// wrong shape, a string that does not parse as an integer, or an
    /// unknown time unit.
    pub fn from_source(
        source: &dyn ConfigSource,
        prefix: &str,
        name: &str,
    ) -> CacheResult<Self> {
        let base = format!("{prefix}.{name}");
        let max_entries = read_bound(source, &format!("{base}.maximum-size"))?;
        let max_weight = read_bound(source, &format!("{base}.maximum-weight"))?;

        let unit = read_unit(source, &format!("{base}.expiration.time-unit"))?;
        let time_to_idle = read_bound(source, &format!("{base}.expiration.time-after-access"))?
            .map(|amount| unit.duration(amount));
        let time_to_live = read_bound(source, &format!("{base}.expiration.time-after-write"))?
            .map(|amount| unit.duration(amount));

        Ok(Self { max_entries, max_weight, time_to_idle, time_to_live })
    }

    /// Capacity bound handed to the engine.
    ///
    /// The engine takes a single capacity, and a weight bound would need a
    /// weigher that declarative configuration cannot supply, so `max_entries`
    /// wins when both bounds are set and `max_weight` alone is applied as
    /// the capacity.
    fn capacity(&self, name: &str) -> Option<u64> {
        match (self.max_entries, self.max_weight) {
            (Some(entries), Some(weight)) => {
                warn!(
                    cache = %name,
                    max_entries = entries,
                    max_weight = weight,
                    "cache configures both maximum-size and maximum-weight; using maximum-size"
                );
                Some(entries)
            }
            (Some(entries), None) => Some(entries),
            (None, weight) => weight,
        }
    }

    pub(crate) fn configure_sync<K, V>(
        &self,
        name: &str,
        mut builder: SyncBuilder<K, V>,
    ) -> SyncBuilder<K, V>
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(capacity) = self.capacity(name) {
            builder = builder.max_capacity(capacity);
        }
        if let Some(idle) = self.time_to_idle {
            builder = builder.time_to_idle(idle);
        }
        if let Some(live) = self.time_to_live {
            builder = builder.time_to_live(live);
        }
        builder
    }

    pub(crate) fn configure_future<K, V>(
        &self,
        name: &str,
        mut builder: FutureBuilder<K, V>,
    ) -> FutureBuilder<K, V>
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(capacity) = self.capacity(name) {
            builder = builder.max_capacity(capacity);
        }
        if let Some(idle) = self.time_to_idle {
            builder = builder.time_to_idle(idle);
        }
        if let Some(live) = self.time_to_live {
            builder = builder.time_to_live(live);
        }
        builder
    }
}

/// Read a positive numeric setting; absent and non-positive values are unset.
fn read_bound(source: &dyn ConfigSource, key: &str) -> CacheResult<Option<u64>> {
    let amount = read_amount(source, key)?;
    Ok(u64::try_from(amount).ok().filter(|amount| *amount > 0))
}

/// Numeric coercion: integers pass through, strings must parse as `i64`,
/// absence reads as zero, anything else is a configuration error.
fn read_amount(source: &dyn ConfigSource, key: &str) -> CacheResult<i64> {
    match source.get(key) {
        None => Ok(0),
        Some(ConfigValue::Integer(value)) => Ok(value),
        Some(ConfigValue::Text(text)) => text.parse::<i64>().map_err(|_| {
            CacheError::InvalidConfig {
                key: key.to_string(),
                reason: format!("'{text}' is not an integer"),
            }
        }),
        Some(other) => Err(CacheError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected an integer, found {}", other.shape()),
        }),
    }
}

fn read_unit(source: &dyn ConfigSource, key: &str) -> CacheResult<ExpirationUnit> {
    match source.get(key) {
        None => Ok(ExpirationUnit::default()),
        Some(ConfigValue::Text(text)) => {
            ExpirationUnit::from_name(&text).ok_or_else(|| CacheError::InvalidConfig {
                key: key.to_string(),
                reason: format!("unknown time unit '{text}'"),
            })
        }
        Some(other) => Err(CacheError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a time unit string, found {}", other.shape()),
        }),
    }
}
