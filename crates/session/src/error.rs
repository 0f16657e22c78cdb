//! Session error types.

use larder_registry::CacheError;
use thiserror::Error;

/// Errors surfaced by the session store.
///
/// Session state lives in a registry-managed cache, so every failure mode
/// today is a cache failure wearing a session hat.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing session cache could not be resolved or operated on.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_message_passes_through() {
        let error = SessionError::from(CacheError::EmptyName);
        assert_eq!(error.to_string(), "cache name must not be empty");
    }
}
