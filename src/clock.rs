use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Trait for wall-clock implementations used by token buckets.
///
/// Buckets may be shared between processes and hosts, so the time is measured
/// from the Unix epoch rather than from an arbitrary per-process origin. All
/// parties sharing a bucket must agree on the clock (within the precision the
/// rate requires).
pub trait Clock {
    /// Returns the current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;
}

/// Converts fractional seconds, saturating at [`Duration::MAX`]. Negative and
/// NaN inputs give zero.
pub(crate) fn saturating_duration(secs: f64) -> Duration {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

pub(crate) fn system_now() -> Duration {
    // a clock set before 1970 is treated as the epoch itself
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Standard clock implementation using [`std::time::SystemTime`].
///
/// # Examples
///
/// ```rust
/// use clepsydra::{Clock, LocalStorage, Rate, SystemClock, TokenBucket};
/// use std::num::NonZeroU32;
///
/// let rate = Rate::per_second(NonZeroU32::new(100).unwrap());
/// let bucket = TokenBucket::with_clock(100, rate, LocalStorage::default(), SystemClock).unwrap();
/// assert!(bucket.clock().now().as_secs() > 0);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        system_now()
    }
}

/// High-precision clock implementation using the `quanta` crate.
///
/// The clock is anchored to the system time when it is created and advanced
/// by quanta's monotonic counter afterwards, so it never jumps when the system
/// time is adjusted. Requires the "quanta" feature to be enabled.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
    epoch_origin: Duration,
}

#[cfg(feature = "quanta")]
impl Default for QuantaClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl QuantaClock {
    /// Creates a new `QuantaClock` from a `quanta::Clock` instance.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            epoch_origin: system_now(),
        }
    }
}

#[cfg(feature = "quanta")]
impl Clock for QuantaClock {
    fn now(&self) -> Duration {
        self.epoch_origin + (self.clock.now() - self.origin)
    }
}

/// Tokio-compatible clock implementation using [`tokio::time::Instant`].
///
/// Anchored to the system time on creation; afterwards it follows tokio's
/// clock, which makes it observe paused and auto-advanced time in tests.
/// Requires the "tokio" feature.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    epoch_origin: Duration,
}

#[cfg(feature = "tokio")]
impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            epoch_origin: system_now(),
        }
    }
}

#[cfg(feature = "tokio")]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.epoch_origin + self.origin.elapsed()
    }
}

/// Manual clock implementation for testing and simulation.
///
/// Allows precise control over time progression, making it ideal for unit tests
/// and deterministic simulations of rate limiting behavior. It also implements
/// [`Sleeper`](crate::Sleeper) by advancing itself, so a
/// [`BlockingConsumer`](crate::BlockingConsumer) never really sleeps.
///
/// # Examples
///
/// ```rust
/// use clepsydra::{LocalStorage, ManualClock, Rate, TokenBucket};
/// use std::num::NonZeroU32;
/// use std::sync::Arc;
///
/// let rate = Rate::per_second(NonZeroU32::new(10).unwrap());
/// let clock = Arc::new(ManualClock::new(1_000.0));
/// let storage = LocalStorage::default();
/// let bucket = TokenBucket::with_clock(10, rate, storage, Arc::clone(&clock)).unwrap();
/// bucket.bootstrap(0).unwrap();
///
/// // Initially no tokens available
/// assert!(!bucket.consume(1).unwrap().is_granted());
///
/// // Advance time by 1 second
/// clock.advance(1.0);
/// assert!(bucket.consume(1).unwrap().is_granted());
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ManualClock {
    /// Creates a new manual clock starting at `now` seconds since the epoch.
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(Duration::from_secs_f64(now)),
        }
    }

    /// Sets the current time to `now` seconds since the epoch.
    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Duration::from_secs_f64(now);
    }

    /// Advances the current time by `delta` seconds.
    pub fn advance(&self, delta: f64) {
        self.advance_by(Duration::from_secs_f64(delta));
    }

    /// Advances the current time by `delta`.
    pub fn advance_by(&self, delta: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for &ManualClock {
    fn now(&self) -> Duration {
        ManualClock::now(self)
    }
}

impl Clock for Arc<ManualClock> {
    fn now(&self) -> Duration {
        ManualClock::now(self)
    }
}
