use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{MICROTIME_LEN, Scope, Storage, pack_microtime, unpack_microtime};
use crate::{FileMutex, StorageError};

/// File based [`Storage`] shared by all processes of one host.
///
/// The timestamp lives in an 8 byte data file. Mutual exclusion comes from an
/// advisory lock on a sibling `<path>.lock` file, which is never removed, so
/// that processes holding it keep sharing one lock across a
/// [`remove`](Storage::remove) and a later bootstrap.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    mutex: FileMutex,
}

impl FileStorage {
    /// Opens the storage at `path`. The data file is only created by
    /// bootstrapping; the lock file is created right away.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        let mutex = FileMutex::open(PathBuf::from(lock_path))?;
        Ok(Self { path, mutex })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    type Mutex = FileMutex;

    fn scope(&self) -> Scope {
        Scope::Global
    }

    fn mutex(&self) -> &FileMutex {
        &self.mutex
    }

    /// A data file of any length but [`MICROTIME_LEN`] is torn or corrupt and
    /// counts as not bootstrapped, so that bootstrapping replaces it.
    fn is_bootstrapped(&self) -> Result<bool, StorageError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(metadata.len() == MICROTIME_LEN as u64),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("could not stat", &self.path, e)),
        }
    }

    fn bootstrap(&self, microtime: f64) -> Result<(), StorageError> {
        fs::write(&self.path, pack_microtime(microtime))
            .map_err(|e| StorageError::io("could not write", &self.path, e))
    }

    fn remove(&self) -> Result<(), StorageError> {
        fs::remove_file(&self.path).map_err(|e| StorageError::io("could not delete", &self.path, e))
    }

    fn microtime(&self) -> Result<f64, StorageError> {
        let bytes =
            fs::read(&self.path).map_err(|e| StorageError::io("could not read", &self.path, e))?;
        unpack_microtime(&bytes)
    }

    fn set_microtime(&self, microtime: f64) -> Result<(), StorageError> {
        // the value is overwritten in place rather than truncated first, so an
        // unlocked reader never observes an empty file
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&pack_microtime(microtime)))
            .map_err(|e| StorageError::io("could not write", &self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket");
        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(Scope::Global, storage.scope());
        assert!(dir.path().join("bucket.lock").exists());
        assert!(!storage.is_bootstrapped().unwrap());
        assert!(matches!(
            storage.microtime(),
            Err(StorageError::Io { .. })
        ));

        storage.bootstrap(1_417_011_228.5).unwrap();
        assert!(storage.is_bootstrapped().unwrap());
        assert_eq!(8, fs::metadata(&path).unwrap().len());

        let other = FileStorage::open(&path).unwrap();
        assert_eq!(1_417_011_228.5, other.microtime().unwrap());
        other.set_microtime(0.1).unwrap();
        assert_eq!(0.1, storage.microtime().unwrap());

        storage.remove().unwrap();
        assert!(!other.is_bootstrapped().unwrap());
        assert!(matches!(storage.remove(), Err(StorageError::Io { .. })));

        other.bootstrap(2.0).unwrap();
        assert_eq!(2.0, storage.microtime().unwrap());
    }

    #[test]
    fn rejects_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket");
        let storage = FileStorage::open(&path).unwrap();
        fs::write(&path, b"123456789").unwrap();
        assert!(matches!(
            storage.microtime(),
            Err(StorageError::InvalidLength(9))
        ));
    }

    #[test]
    fn bootstrap_replaces_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket");
        let storage = FileStorage::open(&path).unwrap();
        for corrupt in [&b"123"[..], b"123456789"] {
            fs::write(&path, corrupt).unwrap();
            assert!(!storage.is_bootstrapped().unwrap());
            storage.bootstrap(2.5).unwrap();
            assert!(storage.is_bootstrapped().unwrap());
            assert_eq!(2.5, storage.microtime().unwrap());
        }
    }
}
