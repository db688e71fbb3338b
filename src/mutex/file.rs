use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{MutexGuard, PoisonError};

use super::{Mutex, ThreadMutex};
use crate::{MutexError, StorageError};

/// Advisory exclusive lock on a file, shared by every process of a host that
/// opens the same path.
///
/// File locks belong to the open file description, so threads sharing one
/// `FileMutex` would not exclude each other through the file lock alone; a
/// [`ThreadMutex`] is taken first for that reason.
#[derive(Debug)]
pub struct FileMutex {
    path: PathBuf,
    file: File,
    threads: ThreadMutex,
}

impl FileMutex {
    /// Opens (creating it if needed) the lock file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io("could not open lock file", &path, e))?;
        Ok(Self {
            path,
            file,
            threads: ThreadMutex::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Guard of a held [`FileMutex`]. Dropping it releases the file lock.
#[derive(Debug)]
pub struct FileMutexGuard<'a> {
    file: &'a File,
    released: bool,
    _threads: MutexGuard<'a, ()>,
}

impl FileMutexGuard<'_> {
    fn release(&mut self) -> std::io::Result<()> {
        self.released = true;
        self.file.unlock()
    }
}

impl Drop for FileMutexGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release();
        }
    }
}

impl Mutex for FileMutex {
    type Guard<'a> = FileMutexGuard<'a>;

    fn lock(&self) -> Result<FileMutexGuard<'_>, MutexError> {
        // guards no data; poisoning is ignored
        let threads = self.threads.0.lock().unwrap_or_else(PoisonError::into_inner);
        self.file.lock().map_err(MutexError::Acquire)?;
        Ok(FileMutexGuard {
            file: &self.file,
            released: false,
            _threads: threads,
        })
    }

    fn unlock<'a>(&'a self, mut guard: FileMutexGuard<'a>) -> Result<(), MutexError> {
        guard.release().map_err(MutexError::Release)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn excludes_independent_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket.lock");
        let inside = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    // every thread opens its own descriptor, like separate processes would
                    let mutex = FileMutex::open(&path).unwrap();
                    for _ in 0..50 {
                        mutex
                            .synchronized(|| {
                                assert_eq!(0, inside.fetch_add(1, Ordering::SeqCst));
                                std::thread::yield_now();
                                inside.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, MutexError>(())
                            })
                            .unwrap();
                    }
                });
            }
        });
    }

    #[test]
    fn excludes_threads_sharing_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mutex = FileMutex::open(dir.path().join("bucket.lock")).unwrap();
        let inside = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let guard = mutex.lock().unwrap();
                        assert_eq!(0, inside.fetch_add(1, Ordering::SeqCst));
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        mutex.unlock(guard).unwrap();
                    }
                });
            }
        });
        assert!(mutex.path().exists());
    }

    #[test]
    fn panicking_holder_does_not_poison() {
        let dir = tempfile::tempdir().unwrap();
        let mutex = FileMutex::open(dir.path().join("bucket.lock")).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mutex.synchronized(|| -> Result<(), MutexError> { panic!("boom") })
        }));
        assert!(outcome.is_err());
        let guard = mutex.lock().unwrap();
        mutex.unlock(guard).unwrap();
    }

    #[test]
    fn dropped_guard_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket.lock");
        let first = FileMutex::open(&path).unwrap();
        let second = FileMutex::open(&path).unwrap();
        drop(first.lock().unwrap());
        assert!(second.file.try_lock().is_ok());
        second.file.unlock().unwrap();
    }
}
