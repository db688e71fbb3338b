pub mod atomic;
pub mod file;
pub mod local;
pub mod session;

use crate::{Mutex, StorageError};

/// Sharing granularity of a [`Storage`] backend.
///
/// Two buckets referencing the same logical state must use storages of the
/// same scope; mixing scopes is a misconfiguration the bucket cannot detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The state lives inside one process and is never shared beyond it.
    Process,
    /// The state is shared by the requests of one user session.
    Session,
    /// The state is shared by all processes (and possibly hosts); the mutex
    /// must provide real mutual exclusion.
    Global,
}

/// Durable home of a bucket's single persisted value, the virtual timestamp
/// ("microtime") from which the available tokens are derived.
///
/// Storages do not guard against races themselves. The
/// [`TokenBucket`](crate::TokenBucket) performs every read-modify-write cycle
/// while holding [`Storage::mutex`], so a backend shared across processes must
/// hand out a mutex with the same reach.
pub trait Storage {
    type Mutex: Mutex;

    /// Sharing granularity of this backend.
    fn scope(&self) -> Scope;

    /// The lock guarding this storage's state.
    fn mutex(&self) -> &Self::Mutex;

    /// Whether the state was already created.
    fn is_bootstrapped(&self) -> Result<bool, StorageError>;

    /// Creates the state with an initial timestamp, unconditionally.
    fn bootstrap(&self, microtime: f64) -> Result<(), StorageError>;

    /// Releases the backend's resources. Afterwards only
    /// [`is_bootstrapped`](Storage::is_bootstrapped) and
    /// [`bootstrap`](Storage::bootstrap) may be called.
    fn remove(&self) -> Result<(), StorageError>;

    /// Reads the stored timestamp.
    fn microtime(&self) -> Result<f64, StorageError>;

    /// Overwrites the stored timestamp.
    fn set_microtime(&self, microtime: f64) -> Result<(), StorageError>;

    /// Signals that the current transaction completes without a write.
    ///
    /// Backends with optimistic concurrency use this to drop a pending
    /// reservation instead of writing an unchanged value.
    fn let_microtime_unchanged(&self) {}
}

/// Length of the persisted timestamp encoding.
pub const MICROTIME_LEN: usize = 8;

/// Encodes a timestamp as 8 little-endian bytes.
pub fn pack_microtime(microtime: f64) -> [u8; MICROTIME_LEN] {
    microtime.to_le_bytes()
}

/// Decodes a timestamp written by [`pack_microtime`].
///
/// Fails with [`StorageError::InvalidLength`] unless `bytes` is exactly 8
/// bytes long.
pub fn unpack_microtime(bytes: &[u8]) -> Result<f64, StorageError> {
    let bytes: [u8; MICROTIME_LEN] = bytes
        .try_into()
        .map_err(|_| StorageError::InvalidLength(bytes.len()))?;
    Ok(f64::from_le_bytes(bytes))
}
