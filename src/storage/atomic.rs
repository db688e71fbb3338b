use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{Scope, Storage};
use crate::{StorageError, ThreadMutex};

struct AtomicF64 {
    storage: AtomicU64,
}

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self {
            storage: AtomicU64::new(value.to_bits()),
        }
    }

    fn store(&self, value: f64, ordering: Ordering) {
        self.storage.store(value.to_bits(), ordering)
    }

    fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.storage.load(ordering))
    }
}

impl Debug for AtomicF64 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

#[derive(Debug)]
struct Shared {
    microtime: AtomicF64,
    bootstrapped: AtomicBool,
    mutex: ThreadMutex,
}

/// Thread-safe in-memory [`Storage`].
///
/// Clones share the same state, so a bucket per thread (or one bucket behind
/// an `Arc`) all draw from one budget. Writes are serialized through a
/// [`ThreadMutex`]; the state does not outlive the process.
#[derive(Debug, Clone)]
pub struct AtomicStorage(Arc<Shared>);

impl Default for AtomicStorage {
    fn default() -> Self {
        Self(Arc::new(Shared {
            microtime: AtomicF64::new(0.0),
            bootstrapped: AtomicBool::new(false),
            mutex: ThreadMutex::default(),
        }))
    }
}

impl Storage for AtomicStorage {
    type Mutex = ThreadMutex;

    fn scope(&self) -> Scope {
        Scope::Process
    }

    fn mutex(&self) -> &ThreadMutex {
        &self.0.mutex
    }

    fn is_bootstrapped(&self) -> Result<bool, StorageError> {
        Ok(self.0.bootstrapped.load(Ordering::Acquire))
    }

    fn bootstrap(&self, microtime: f64) -> Result<(), StorageError> {
        self.0.microtime.store(microtime, Ordering::Relaxed);
        self.0.bootstrapped.store(true, Ordering::Release);
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.0.bootstrapped.store(false, Ordering::Release);
        Ok(())
    }

    fn microtime(&self) -> Result<f64, StorageError> {
        if !self.0.bootstrapped.load(Ordering::Acquire) {
            return Err(StorageError::NotBootstrapped);
        }
        Ok(self.0.microtime.load(Ordering::Relaxed))
    }

    fn set_microtime(&self, microtime: f64) -> Result<(), StorageError> {
        self.0.microtime.store(microtime, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let storage = AtomicStorage::default();
        let other = storage.clone();
        assert_eq!(Scope::Process, storage.scope());
        assert!(!other.is_bootstrapped().unwrap());
        assert!(matches!(
            other.microtime(),
            Err(StorageError::NotBootstrapped)
        ));

        storage.bootstrap(1_417_011_228.25).unwrap();
        assert!(other.is_bootstrapped().unwrap());
        assert_eq!(1_417_011_228.25, other.microtime().unwrap());

        other.set_microtime(1_417_011_229.5).unwrap();
        assert_eq!(1_417_011_229.5, storage.microtime().unwrap());

        other.remove().unwrap();
        assert!(!storage.is_bootstrapped().unwrap());
    }
}
