use std::time::Duration;

use likely_stable::unlikely;
use tracing::{debug, trace};

use crate::converter::seconds_since;
use crate::error::RateLimited;
use crate::{Clock, Error, Mutex, Rate, Storage, StorageError, SystemClock, TokenConverter};

/// Outcome of [`TokenBucket::consume`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Consumption {
    /// The tokens were taken from the bucket.
    Granted,
    /// Not enough tokens are available; nothing was taken.
    Limited(RateLimited),
}

impl Consumption {
    pub fn is_granted(&self) -> bool {
        matches!(self, Consumption::Granted)
    }

    /// How long to wait before the same request could be granted, zero when
    /// it was granted.
    pub fn wait_time(&self) -> Duration {
        match self {
            Consumption::Granted => Duration::ZERO,
            Consumption::Limited(limited) => limited.earliest_retry_after(),
        }
    }

    /// Like [`wait_time`](Self::wait_time) in fractional seconds.
    pub fn wait_secs(&self) -> f64 {
        match self {
            Consumption::Granted => 0.0,
            Consumption::Limited(limited) => limited.wait_secs(),
        }
    }
}

/// A token bucket whose state lives entirely in a [`Storage`].
///
/// Tokens accumulate at a steady rate up to the bucket's capacity and every
/// operation takes tokens out. Instead of a token counter the storage holds a
/// single virtual timestamp: the tokens available are the tokens produced
/// between that timestamp and now. Consuming moves the timestamp forward,
/// waiting refills the bucket without anyone writing.
///
/// The bucket itself holds nothing but its configuration, so any number of
/// buckets (in any number of processes) can share one state through storages
/// of the same [`Scope`](crate::Scope).
///
/// # Type Parameters
///
/// - `S`: Storage backend holding the shared state
/// - `C`: Clock implementation (default: [`SystemClock`])
///
/// # Examples
///
/// ```rust
/// use clepsydra::{AtomicStorage, Rate, TokenBucket};
/// use std::num::NonZeroU32;
///
/// let rate = Rate::per_second(NonZeroU32::new(10).unwrap());
/// let bucket = TokenBucket::new(20, rate, AtomicStorage::default()).unwrap();
/// bucket.bootstrap(20).unwrap();
///
/// match bucket.consume(5).unwrap() {
///     consumption if consumption.is_granted() => println!("go ahead"),
///     consumption => println!("retry in {:?}", consumption.wait_time()),
/// }
/// ```
#[derive(Debug)]
pub struct TokenBucket<S, C = SystemClock> {
    capacity: u64,
    rate: Rate,
    converter: TokenConverter,
    storage: S,
    clock: C,
}

impl<S: Storage> TokenBucket<S, SystemClock> {
    /// Creates a bucket of `capacity` tokens refilling at `rate`, keeping its
    /// state in `storage` and reading the system clock.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: u64, rate: Rate, storage: S) -> Result<Self, Error> {
        Self::with_clock(capacity, rate, storage, SystemClock)
    }
}

impl<S: Storage, C: Clock> TokenBucket<S, C> {
    /// Creates a bucket with a custom clock implementation, such as a
    /// [`ManualClock`](crate::ManualClock) for testing.
    pub fn with_clock(capacity: u64, rate: Rate, storage: S, clock: C) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "capacity should be greater than 0".to_owned(),
            ));
        }
        Ok(Self {
            capacity,
            rate,
            converter: TokenConverter::new(&rate),
            storage,
            clock,
        })
    }

    /// Initializes the storage with `initial_tokens` available.
    ///
    /// Returns silently when the storage was already bootstrapped, by this or
    /// any other bucket sharing it, so it is safe to call on every start.
    /// Only one of several racing initializers writes.
    pub fn bootstrap(&self, initial_tokens: u64) -> Result<(), Error> {
        if unlikely(initial_tokens > self.capacity) {
            return Err(Error::CapacityExceeded {
                requested: initial_tokens,
                capacity: self.capacity,
            });
        }
        let written = self
            .storage
            .mutex()
            .check(|| self.storage.is_bootstrapped().map(|bootstrapped| !bootstrapped))
            .then(|| {
                let microtime = self
                    .converter
                    .tokens_to_timestamp(initial_tokens, self.clock.now());
                self.storage.bootstrap(microtime).map(|()| microtime)
            })?;
        match written {
            Some(microtime) => debug!(
                capacity = self.capacity,
                initial_tokens, microtime, "bootstrapped token bucket"
            ),
            None => trace!("token bucket already bootstrapped"),
        }
        Ok(())
    }

    /// Takes `tokens` out of the bucket if that many are available.
    ///
    /// Otherwise nothing is taken and the returned [`Consumption::Limited`]
    /// tells how long it takes until `tokens` will have accumulated. The
    /// whole read-decide-write cycle runs under the storage's mutex.
    ///
    /// Fails with [`Error::InvalidArgument`] for zero tokens and with
    /// [`Error::CapacityExceeded`] for more tokens than the bucket can ever
    /// hold.
    pub fn consume(&self, tokens: u64) -> Result<Consumption, Error> {
        self.check_request(tokens)?;
        let consumption = self.storage.mutex().synchronized(|| {
            let now = self.clock.now();
            let (microtime, available) = self.load(now)?;
            let needed = self.converter.tokens_to_seconds(tokens);
            if available < tokens {
                self.storage.let_microtime_unchanged();
                let wait_secs = (needed - seconds_since(now, microtime)).max(0.0);
                return Ok::<_, StorageError>(Consumption::Limited(RateLimited { wait_secs }));
            }
            self.storage.set_microtime(microtime + needed)?;
            Ok(Consumption::Granted)
        })?;
        trace!(tokens, ?consumption, "consume");
        Ok(consumption)
    }

    /// Tokens currently available, without consuming them.
    ///
    /// This reads the storage without taking the lock; the result is advisory
    /// and may be stale by the time it is used.
    pub fn tokens(&self) -> Result<u64, Error> {
        let (_, available) = self.load(self.clock.now())?;
        Ok(available)
    }

    /// Token capacity; the bucket never holds more than this.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn check_request(&self, tokens: u64) -> Result<(), Error> {
        if unlikely(tokens == 0) {
            return Err(Error::InvalidArgument(
                "token amount should be greater than 0".to_owned(),
            ));
        }
        if unlikely(tokens > self.capacity) {
            return Err(Error::CapacityExceeded {
                requested: tokens,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Loads the stored timestamp, dropping tokens that overflow the capacity,
    /// together with the whole tokens it represents.
    fn load(&self, now: Duration) -> Result<(f64, u64), StorageError> {
        let stored = self.storage.microtime()?;
        let full = self.converter.tokens_to_timestamp(self.capacity, now);
        let microtime = stored.max(full);
        let available = self.converter.timestamp_to_tokens(microtime, now).max(0) as u64;
        Ok((microtime, available))
    }
}
