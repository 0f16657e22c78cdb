//! Session store backed by a registry-managed cache.
//!
//! The store keeps every live [`Session`] in the loading cache named
//! [`SESSION_CACHE`]. Lookups ride the cache's lock-free read path;
//! only session creation takes a lock, and a single store-wide one at
//! that. Creation is rare next to retrieval, so one coarse lock beats
//! per-id bookkeeping until contention says otherwise.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use larder_registry::{BoxedError, CacheLoader, CacheRegistry, LazyLoadingCache};

use crate::error::SessionResult;
use crate::session::Session;

/// Name of the cache holding live sessions. Reserved: registering other
/// capabilities under this name collides with the store's own loader.
pub const SESSION_CACHE: &str = "session-cache";

/// The transport-side view of a request/response exchange.
///
/// The store reads the inbound session id from it and attaches the id of
/// any newly created session, typically into a response cookie or header.
pub trait SessionExchange {
    /// Session id carried by the inbound request, if any.
    fn session_id(&self) -> Option<String>;

    /// Attach a newly created session's id to the outbound response.
    fn attach_session_id(&mut self, id: &str);
}

/// Sessions only exist once the store has created them, so the cache
/// loader has nothing to materialize. It satisfies the loading flavor's
/// loader requirement and answers absent for every key.
struct SessionCacheLoader;

impl CacheLoader<String, Session> for SessionCacheLoader {
    fn load(&self, _key: &String) -> Result<Option<Session>, BoxedError> {
        Ok(None)
    }
}

/// Cache-backed session store.
#[derive(Debug)]
pub struct SessionStore {
    cache: LazyLoadingCache<String, Session>,
    creation_lock: Mutex<()>,
}

impl SessionStore {
    /// Create a store on top of `registry`.
    ///
    /// Registers the session loader and takes a lazy handle; the cache
    /// itself is built on the first session operation.
    #[must_use]
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        registry
            .providers()
            .register_loader::<String, Session>(SESSION_CACHE, Arc::new(SessionCacheLoader));
        Self {
            cache: LazyLoadingCache::new(registry, SESSION_CACHE),
            creation_lock: Mutex::new(()),
        }
    }

    /// Return the session for the exchange, creating one if none exists.
    ///
    /// A present session is returned straight off the cache read path.
    /// Otherwise the store takes the creation lock, re-checks the cache,
    /// and only then creates, attaches, and stores a new session. The id
    /// is taken from the exchange when it carries one, else freshly
    /// generated; `attach_session_id` runs exactly once per created
    /// session, never for retrievals.
    ///
    /// # Errors
    /// Cache resolution errors from the underlying registry.
    pub fn create_or_retrieve(&self, exchange: &mut dyn SessionExchange) -> SessionResult<Session> {
        let id = exchange.session_id().unwrap_or_else(generate_session_id);
        if let Some(session) = self.cache.get_present(&id)? {
            debug!(session_id = %id, "session retrieved");
            return Ok(session);
        }

        let _guard = self.creation_lock.lock();
        // Another thread may have created this session while we waited
        // for the lock.
        if let Some(session) = self.cache.get_present(&id)? {
            debug!(session_id = %id, "session retrieved");
            return Ok(session);
        }

        let session = Session::new(&id);
        exchange.attach_session_id(&id);
        self.cache.insert(id.clone(), session.clone())?;
        debug!(session_id = %id, "session created");
        Ok(session)
    }

    /// Drop the session from the store.
    ///
    /// # Errors
    /// Cache resolution errors from the underlying registry.
    pub fn invalidate_session(&self, session: &Session) -> SessionResult<()> {
        self.cache.invalidate(session.id())?;
        debug!(session_id = %session.id(), "session invalidated");
        Ok(())
    }

    /// Write the session's current state back to the store.
    ///
    /// # Errors
    /// Cache resolution errors from the underlying registry.
    pub fn flush(&self, session: &Session) -> SessionResult<()> {
        self.store_session(session.id(), session.clone())
    }

    /// Read a session by id without creating one.
    ///
    /// # Errors
    /// Cache resolution errors from the underlying registry.
    pub fn session_from_cache(&self, id: &str) -> SessionResult<Option<Session>> {
        Ok(self.cache.get_present(id)?)
    }

    /// Store a session under an explicit id.
    ///
    /// # Errors
    /// Cache resolution errors from the underlying registry.
    pub fn store_session(&self, id: &str, session: Session) -> SessionResult<()> {
        self.cache.insert(id.to_string(), session)?;
        Ok(())
    }
}

fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_registry::StaticConfig;

    #[derive(Default)]
    struct TestExchange {
        id: Option<String>,
        attach_calls: usize,
    }

    impl TestExchange {
        fn with_id(id: &str) -> Self {
            Self { id: Some(id.to_string()), attach_calls: 0 }
        }
    }

    impl SessionExchange for TestExchange {
        fn session_id(&self) -> Option<String> {
            self.id.clone()
        }

        fn attach_session_id(&mut self, id: &str) {
            self.id = Some(id.to_string());
            self.attach_calls += 1;
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(CacheRegistry::new(Arc::new(StaticConfig::new()))))
    }

    #[test]
    fn test_create_attaches_a_generated_id() {
        let store = store();
        let mut exchange = TestExchange::default();

        let session = store.create_or_retrieve(&mut exchange).unwrap();

        assert_eq!(exchange.attach_calls, 1);
        assert_eq!(exchange.id.as_deref(), Some(session.id()));
        assert!(!session.id().is_empty());
    }

    #[test]
    fn test_retrieve_does_not_attach_again() {
        let store = store();
        let mut exchange = TestExchange::default();

        let created = store.create_or_retrieve(&mut exchange).unwrap();
        let retrieved = store.create_or_retrieve(&mut exchange).unwrap();

        assert_eq!(retrieved, created);
        assert_eq!(exchange.attach_calls, 1);
    }

    #[test]
    fn test_inbound_id_is_reused_for_creation() {
        let store = store();
        let mut exchange = TestExchange::with_id("123");

        let session = store.create_or_retrieve(&mut exchange).unwrap();

        assert_eq!(session.id(), "123");
        assert_eq!(exchange.attach_calls, 1);
    }

    #[test]
    fn test_invalidate_removes_the_session() {
        let store = store();
        let mut exchange = TestExchange::with_id("123");
        let session = store.create_or_retrieve(&mut exchange).unwrap();

        store.invalidate_session(&session).unwrap();

        assert_eq!(store.session_from_cache("123").unwrap(), None);
    }

    #[test]
    fn test_flush_persists_attribute_changes() {
        let store = store();
        let mut exchange = TestExchange::with_id("123");
        let mut session = store.create_or_retrieve(&mut exchange).unwrap();

        session.set_attribute("user", "jane");
        assert_eq!(
            store.session_from_cache("123").unwrap().unwrap().attribute("user"),
            None
        );

        store.flush(&session).unwrap();
        assert_eq!(
            store.session_from_cache("123").unwrap().unwrap().attribute("user"),
            Some(&serde_json::Value::from("jane"))
        );
    }

    #[test]
    fn test_store_session_under_explicit_id() {
        let store = store();
        let session = Session::new("ghost");

        store.store_session("123", session.clone()).unwrap();

        assert_eq!(store.session_from_cache("123").unwrap(), Some(session));
    }
}
