use std::cell::Cell;

use super::{Scope, Storage};
use crate::{NoMutex, StorageError};

/// Non atomic implementation of [`Storage`]. This is intended for single
/// threaded scenarios and uses [`Cell`] internally; the state disappears with
/// the value.
#[derive(Debug, Default)]
pub struct LocalStorage {
    microtime: Cell<Option<f64>>,
    mutex: NoMutex,
}

impl Storage for LocalStorage {
    type Mutex = NoMutex;

    fn scope(&self) -> Scope {
        Scope::Process
    }

    fn mutex(&self) -> &NoMutex {
        &self.mutex
    }

    fn is_bootstrapped(&self) -> Result<bool, StorageError> {
        Ok(self.microtime.get().is_some())
    }

    fn bootstrap(&self, microtime: f64) -> Result<(), StorageError> {
        self.set_microtime(microtime)
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.microtime.set(None);
        Ok(())
    }

    fn microtime(&self) -> Result<f64, StorageError> {
        self.microtime.get().ok_or(StorageError::NotBootstrapped)
    }

    fn set_microtime(&self, microtime: f64) -> Result<(), StorageError> {
        self.microtime.set(Some(microtime));
        Ok(())
    }
}
