//! Cache-backed server sessions.
//!
//! Builds on `larder-registry`: sessions live in the reserved loading
//! cache named [`SESSION_CACHE`], sized and expired like any other cache
//! through `server.cache.session-cache.*` configuration keys.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use larder_registry::{CacheRegistry, StaticConfig};
//! use larder_session::{SessionExchange, SessionStore};
//!
//! struct Exchange {
//!     cookie: Option<String>,
//! }
//!
//! impl SessionExchange for Exchange {
//!     fn session_id(&self) -> Option<String> {
//!         self.cookie.clone()
//!     }
//!     fn attach_session_id(&mut self, id: &str) {
//!         self.cookie = Some(id.to_string());
//!     }
//! }
//!
//! let registry = Arc::new(CacheRegistry::new(Arc::new(StaticConfig::new())));
//! let store = SessionStore::new(Arc::clone(&registry));
//!
//! let mut exchange = Exchange { cookie: None };
//! let mut session = store.create_or_retrieve(&mut exchange)?;
//! session.set_attribute("user", "jane");
//! store.flush(&session)?;
//! # Ok::<(), larder_session::SessionError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod session;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use session::Session;
pub use store::{SessionExchange, SessionStore, SESSION_CACHE};
