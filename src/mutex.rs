mod file;

pub use file::{FileMutex, FileMutexGuard};

use std::sync::MutexGuard;

use crate::MutexError;

/// Mutual exclusion around the read-modify-write cycles of a
/// [`Storage`](crate::Storage).
///
/// Implementations only provide [`lock`](Mutex::lock) (and optionally
/// [`unlock`](Mutex::unlock) when releasing can fail). Dropping the guard must
/// release the lock, which is what keeps the lock from leaking on early
/// returns and panics inside [`synchronized`](Mutex::synchronized).
pub trait Mutex {
    /// Proof of ownership of the lock.
    type Guard<'a>
    where
        Self: 'a;

    /// Blocks until the lock is acquired.
    fn lock(&self) -> Result<Self::Guard<'_>, MutexError>;

    /// Releases the lock, reporting failures that a plain drop would swallow.
    fn unlock<'a>(&'a self, _guard: Self::Guard<'a>) -> Result<(), MutexError> {
        Ok(())
    }

    /// Runs `section` while holding the lock.
    ///
    /// An error returned by `section` takes precedence over an error
    /// releasing the lock.
    fn synchronized<T, E, F>(&self, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<MutexError>,
    {
        let guard = self.lock()?;
        let result = section();
        let released = self.unlock(guard);
        let value = result?;
        released?;
        Ok(value)
    }

    /// Starts a check-then-act sequence.
    ///
    /// See [`Check::then`].
    fn check<P>(&self, predicate: P) -> Check<'_, Self, P>
    where
        Self: Sized,
    {
        Check {
            mutex: self,
            predicate,
        }
    }
}

/// A pending check-then-act sequence created by [`Mutex::check`].
#[must_use = "the action only runs through `then`"]
pub struct Check<'a, M, P> {
    mutex: &'a M,
    predicate: P,
}

impl<M: Mutex, P> Check<'_, M, P> {
    /// Runs `action` if the predicate holds.
    ///
    /// The predicate is evaluated once without the lock; if it holds the lock
    /// is acquired and the predicate evaluated again, and only if it still
    /// holds the action runs, under the lock. Returns `Ok(None)` when the
    /// action did not run.
    ///
    /// ```rust
    /// use clepsydra::{Mutex, MutexError, ThreadMutex};
    /// use std::cell::Cell;
    ///
    /// let mutex = ThreadMutex::default();
    /// let initialized = Cell::new(false);
    /// for _ in 0..3 {
    ///     mutex
    ///         .check(|| Ok::<_, MutexError>(!initialized.get()))
    ///         .then(|| Ok(initialized.set(true)))
    ///         .unwrap();
    /// }
    /// assert!(initialized.get());
    /// ```
    pub fn then<T, E, F>(self, action: F) -> Result<Option<T>, E>
    where
        P: FnMut() -> Result<bool, E>,
        F: FnOnce() -> Result<T, E>,
        E: From<MutexError>,
    {
        let Check {
            mutex,
            mut predicate,
        } = self;
        if !predicate()? {
            return Ok(None);
        }
        mutex.synchronized(|| {
            if !predicate()? {
                return Ok(None);
            }
            action().map(Some)
        })
    }
}

/// A mutex that never blocks.
///
/// Suitable when the state is never shared between concurrent holders, as with
/// process-local or session storages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMutex;

impl Mutex for NoMutex {
    type Guard<'a> = ();

    fn lock(&self) -> Result<(), MutexError> {
        Ok(())
    }
}

/// Mutual exclusion between threads of one process.
#[derive(Debug, Default)]
pub struct ThreadMutex(std::sync::Mutex<()>);

impl Mutex for ThreadMutex {
    type Guard<'a> = MutexGuard<'a, ()>;

    fn lock(&self) -> Result<MutexGuard<'_, ()>, MutexError> {
        self.0.lock().map_err(|_| MutexError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Section,
        Mutex,
    }

    impl From<MutexError> for TestError {
        fn from(_: MutexError) -> Self {
            TestError::Mutex
        }
    }

    /// Counts acquisitions and releases, optionally failing the release.
    #[derive(Default)]
    struct CountingMutex {
        locked: Cell<usize>,
        unlocked: Cell<usize>,
        fail_release: bool,
    }

    struct CountingGuard<'a>(&'a CountingMutex);

    impl Drop for CountingGuard<'_> {
        fn drop(&mut self) {
            self.0.unlocked.set(self.0.unlocked.get() + 1);
        }
    }

    impl Mutex for CountingMutex {
        type Guard<'a> = CountingGuard<'a>;

        fn lock(&self) -> Result<CountingGuard<'_>, MutexError> {
            self.locked.set(self.locked.get() + 1);
            Ok(CountingGuard(self))
        }

        fn unlock<'a>(&'a self, guard: CountingGuard<'a>) -> Result<(), MutexError> {
            drop(guard);
            if self.fail_release {
                return Err(MutexError::Poisoned);
            }
            Ok(())
        }
    }

    #[test]
    fn synchronized_releases_on_error() {
        let mutex = CountingMutex::default();
        let result: Result<(), _> = mutex.synchronized(|| Err(TestError::Section));
        assert_eq!(Err(TestError::Section), result);
        assert_eq!(1, mutex.locked.get());
        assert_eq!(1, mutex.unlocked.get());
    }

    #[test]
    fn section_error_wins_over_release_error() {
        let mutex = CountingMutex {
            fail_release: true,
            ..Default::default()
        };
        let result: Result<(), _> = mutex.synchronized(|| Err(TestError::Section));
        assert_eq!(Err(TestError::Section), result);
        let result = mutex.synchronized(|| Ok::<_, TestError>(1));
        assert_eq!(Err(TestError::Mutex), result);
    }

    #[test]
    fn synchronized_releases_on_panic() {
        let mutex = ThreadMutex::default();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mutex.synchronized(|| -> Result<(), MutexError> { panic!("boom") })
        }));
        assert!(outcome.is_err());
        // a panicking holder poisons the lock instead of leaking it
        assert!(matches!(mutex.lock(), Err(MutexError::Poisoned)));
    }

    #[test]
    fn check_skips_lock_when_predicate_fails() {
        let mutex = CountingMutex::default();
        let ran = mutex
            .check(|| Ok::<_, TestError>(false))
            .then(|| Ok(()))
            .unwrap();
        assert_eq!(None, ran);
        assert_eq!(0, mutex.locked.get());
    }

    #[test]
    fn check_rechecks_under_lock() {
        let mutex = CountingMutex::default();
        let calls = Cell::new(0);
        // holds on the first evaluation only, as if another initializer won the race
        let ran = mutex
            .check(|| {
                calls.set(calls.get() + 1);
                Ok::<_, TestError>(calls.get() == 1)
            })
            .then(|| Ok(()))
            .unwrap();
        assert_eq!(None, ran);
        assert_eq!(2, calls.get());
        assert_eq!(1, mutex.locked.get());
        assert_eq!(1, mutex.unlocked.get());

        let ran = mutex.check(|| Ok::<_, TestError>(true)).then(|| Ok(7));
        assert_eq!(Ok(Some(7)), ran);
    }

    #[test]
    fn thread_mutex_serializes_sections() {
        let mutex = Arc::new(ThreadMutex::default());
        let inside = Arc::new(AtomicUsize::new(0));
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
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
}
