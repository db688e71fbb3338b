use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Scope, Storage};
use crate::{NoMutex, StorageError};

/// Prefix of every bucket key inside a [`Session`].
pub const SESSION_NAMESPACE: &str = "TokenBucket_";

/// Per-user session state, shared by all requests of that session.
///
/// Cloning a session yields a handle to the same state.
#[derive(Debug, Default, Clone)]
pub struct Session(Arc<Mutex<HashMap<String, f64>>>);

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        // a plain map of floats has no invariant a panicking writer could break
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Storage`] that keeps the bucket inside a user's [`Session`].
///
/// A session's requests are expected to be handled one at a time, so no real
/// mutual exclusion is provided.
#[derive(Debug)]
pub struct SessionStorage {
    session: Session,
    key: String,
    mutex: NoMutex,
}

impl SessionStorage {
    /// Creates a storage for the bucket `name` inside `session`.
    pub fn new(session: &Session, name: &str) -> Self {
        Self {
            session: session.clone(),
            key: format!("{SESSION_NAMESPACE}{name}"),
            mutex: NoMutex,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Storage for SessionStorage {
    type Mutex = NoMutex;

    fn scope(&self) -> Scope {
        Scope::Session
    }

    fn mutex(&self) -> &NoMutex {
        &self.mutex
    }

    fn is_bootstrapped(&self) -> Result<bool, StorageError> {
        Ok(self.session.values().contains_key(&self.key))
    }

    fn bootstrap(&self, microtime: f64) -> Result<(), StorageError> {
        self.set_microtime(microtime)
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.session.values().remove(&self.key);
        Ok(())
    }

    fn microtime(&self) -> Result<f64, StorageError> {
        self.session
            .values()
            .get(&self.key)
            .copied()
            .ok_or(StorageError::NotBootstrapped)
    }

    fn set_microtime(&self, microtime: f64) -> Result<(), StorageError> {
        self.session.values().insert(self.key.clone(), microtime);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_namespaced_per_name() {
        let session = Session::new();
        let api = SessionStorage::new(&session, "api");
        let login = SessionStorage::new(&session, "login");
        assert_eq!("TokenBucket_api", api.key());
        assert_eq!(Scope::Session, api.scope());

        api.bootstrap(10.0).unwrap();
        assert!(api.is_bootstrapped().unwrap());
        assert!(!login.is_bootstrapped().unwrap());
        assert!(matches!(
            login.microtime(),
            Err(StorageError::NotBootstrapped)
        ));

        // a second handle on the same session sees the same bucket
        let again = SessionStorage::new(&session.clone(), "api");
        assert_eq!(10.0, again.microtime().unwrap());
        again.set_microtime(11.0).unwrap();
        assert_eq!(11.0, api.microtime().unwrap());

        api.remove().unwrap();
        assert!(!again.is_bootstrapped().unwrap());
    }

    #[test]
    fn sessions_are_isolated() {
        let alice = SessionStorage::new(&Session::new(), "api");
        let bob = SessionStorage::new(&Session::new(), "api");
        alice.bootstrap(1.0).unwrap();
        assert!(!bob.is_bootstrapped().unwrap());
    }
}
