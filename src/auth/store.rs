//! Key-value backends for server-side session records.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Backend(String),
    #[error("session signing key rejected: {0}")]
    Key(String),
}

/// The get/set/clear contract a session backend has to honor.
///
/// Values expire after the TTL given to [`SessionStore::set`]; an expired key
/// reads as absent.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SessionError>;

    fn clear(&self, key: &str) -> Result<(), SessionError>;

    /// Read and remove in one step. Backends with an atomic primitive override this.
    fn take(&self, key: &str) -> Result<Option<String>, SessionError> {
        let value = self.get(key)?;
        if value.is_some() {
            self.clear(key)?;
        }
        Ok(value)
    }
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(v, _)| v.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SessionError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Expired sessions evicted");
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<String>, SessionError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(v, _)| v))
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisSessionStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::{SessionError, SessionStore};
    use std::time::Duration;

    /// Redis-backed store; each call checks a connection out of the client.
    pub struct RedisSessionStore {
        client: redis::Client,
    }

    impl RedisSessionStore {
        /// Open a client for `redis://host:port/` and verify it answers `PING`.
        ///
        /// # Errors
        ///
        /// [`SessionError::Backend`] when the URL is invalid or the server is unreachable.
        pub fn connect(url: &str) -> Result<Self, SessionError> {
            let client = redis::Client::open(url).map_err(backend)?;
            let store = Self { client };
            let mut con = store.connection()?;
            redis::cmd("PING").query::<String>(&mut con).map_err(backend)?;
            Ok(store)
        }

        fn connection(&self) -> Result<redis::Connection, SessionError> {
            self.client.get_connection().map_err(backend)
        }
    }

    fn backend(e: redis::RedisError) -> SessionError {
        SessionError::Backend(e.to_string())
    }

    impl SessionStore for RedisSessionStore {
        fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
            let mut con = self.connection()?;
            redis::cmd("GET")
                .arg(key)
                .query::<Option<String>>(&mut con)
                .map_err(backend)
        }

        fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SessionError> {
            let mut con = self.connection()?;
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query::<()>(&mut con)
                .map_err(backend)
        }

        fn clear(&self, key: &str) -> Result<(), SessionError> {
            let mut con = self.connection()?;
            redis::cmd("DEL").arg(key).query::<()>(&mut con).map_err(backend)
        }

        fn take(&self, key: &str) -> Result<Option<String>, SessionError> {
            let mut con = self.connection()?;
            redis::cmd("GETDEL")
                .arg(key)
                .query::<Option<String>>(&mut con)
                .map_err(backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let store = MemorySessionStore::new();
        store.set("session_a", "7", Duration::from_secs(60)).unwrap();
        assert_eq!(store.get("session_a").unwrap().as_deref(), Some("7"));
        store.clear("session_a").unwrap();
        assert_eq!(store.get("session_a").unwrap(), None);
    }

    #[test]
    fn test_expired_entry_reads_absent() {
        let store = MemorySessionStore::new();
        store.set("k", "v", Duration::ZERO).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_take_is_single_use() {
        let store = MemorySessionStore::new();
        store.set("oauth_state_x", "google", Duration::from_secs(60)).unwrap();
        assert_eq!(store.take("oauth_state_x").unwrap().as_deref(), Some("google"));
        assert_eq!(store.take("oauth_state_x").unwrap(), None);
    }
}
