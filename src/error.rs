use std::fmt::{Debug, Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::clock::saturating_duration;

/// Errors returned by buckets and consumers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rate, capacity or timeout was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A token amount was rejected by an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The requested amount can never be satisfied because it is larger than
    /// the bucket's capacity.
    #[error("requested {requested} tokens but the bucket capacity is {capacity}")]
    CapacityExceeded { requested: u64, capacity: u64 },
    /// Reading, writing or locking the persisted bucket state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A consumer gave up waiting for tokens.
    #[error("timed out after {0:?} waiting for tokens")]
    TimedOut(Duration),
}

/// Failures of a [`Storage`](crate::Storage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("bucket storage has not been bootstrapped")]
    NotBootstrapped,
    /// The persisted value is not an 8 byte double.
    #[error("stored timestamp must be exactly 8 bytes long, found {0}")]
    InvalidLength(usize),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Mutex(#[from] MutexError),
    /// Escape hatch for backends living outside of this crate.
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Failures of a [`Mutex`](crate::Mutex) implementation.
#[derive(Debug, thiserror::Error)]
pub enum MutexError {
    #[error("could not acquire lock: {0}")]
    Acquire(#[source] io::Error),
    #[error("could not release lock: {0}")]
    Release(#[source] io::Error),
    #[error("lock was poisoned by a panicking holder")]
    Poisoned,
}

/// The bucket does not hold enough tokens right now.
///
/// Returned inside [`Consumption::Limited`](crate::Consumption::Limited)
/// together with an estimate of how long the caller has to wait.
#[derive(Clone, Copy, PartialEq)]
pub struct RateLimited {
    pub(crate) wait_secs: f64,
}

impl RateLimited {
    /// The suggested duration to wait before retrying, saturating at
    /// [`Duration::MAX`] for waits too long to represent.
    pub fn earliest_retry_after(&self) -> Duration {
        saturating_duration(self.wait_secs)
    }

    /// The suggested duration to wait before retrying in fractional seconds.
    pub fn wait_secs(&self) -> f64 {
        self.wait_secs
    }
}

impl Debug for RateLimited {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rate limited; suggested nap duration is {:?}",
            self.earliest_retry_after()
        )
    }
}

impl Display for RateLimited {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rate limited; suggested nap duration is {}s",
            self.wait_secs
        )
    }
}

impl std::error::Error for RateLimited {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rate_limited() {
        let rl = RateLimited { wait_secs: 10.0 };
        assert_eq!(
            "rate limited; suggested nap duration is 10s",
            rl.to_string()
        );
        assert_eq!(Duration::from_secs(10), rl.earliest_retry_after());
    }

    #[test]
    fn unrepresentable_waits_saturate() {
        // one token per year, a trillion tokens short
        let rl = RateLimited {
            wait_secs: 3.155_692_6e19,
        };
        assert_eq!(Duration::MAX, rl.earliest_retry_after());
        assert!(format!("{rl:?}").starts_with("rate limited"));
        assert_eq!(
            Duration::MAX,
            RateLimited { wait_secs: f64::INFINITY }.earliest_retry_after()
        );
    }

    #[test]
    fn display_capacity_exceeded() {
        let err = Error::CapacityExceeded {
            requested: 21,
            capacity: 20,
        };
        assert_eq!(
            "requested 21 tokens but the bucket capacity is 20",
            err.to_string()
        );
    }

    #[test]
    fn mutex_errors_surface_as_storage_errors() {
        let err = Error::from(StorageError::from(MutexError::Poisoned));
        assert!(matches!(
            err,
            Error::Storage(StorageError::Mutex(MutexError::Poisoned))
        ));
        assert_eq!("lock was poisoned by a panicking holder", err.to_string());
    }

    #[test]
    fn io_error_mentions_path() {
        let err = StorageError::io(
            "could not read",
            "/tmp/bucket",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!("could not read /tmp/bucket: gone", err.to_string());
    }
}
