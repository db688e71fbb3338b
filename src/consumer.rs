use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::saturating_duration;
use crate::{Clock, Consumption, Error, ManualClock, Storage, SystemClock, TokenBucket};

/// Shortest nap between two attempts; sleeping less is below the scheduler's
/// granularity anyway.
pub(crate) const MIN_NAP: Duration = Duration::from_millis(1);

/// How a consumer waits between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper blocking the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Sleeping on a manual clock just moves it forward.
impl Sleeper for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

impl Sleeper for &ManualClock {
    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

impl Sleeper for Arc<ManualClock> {
    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

/// The naps covering a wait of `wait_secs`: whole seconds first, leaving more
/// than one second over, then the remainder, never shorter than [`MIN_NAP`].
pub(crate) fn naps(wait_secs: f64) -> (Option<Duration>, Duration) {
    let mut remaining = wait_secs.max(0.0);
    let mut coarse = None;
    if remaining > 1.0 {
        let whole = remaining.trunc() - 1.0;
        if whole > 0.0 {
            coarse = Some(saturating_duration(whole));
            remaining -= whole;
        }
    }
    (coarse, saturating_duration(remaining).max(MIN_NAP))
}

/// Seconds a rejected attempt should wait, or `TimedOut` when the deadline
/// has passed.
pub(crate) fn next_wait(
    consumption: Consumption,
    now: Duration,
    deadline: Option<Duration>,
    timeout: Option<Duration>,
) -> Result<f64, Error> {
    let wait_secs = consumption.wait_secs();
    let (Some(deadline), Some(timeout)) = (deadline, timeout) else {
        return Ok(wait_secs);
    };
    if now >= deadline {
        warn!(?timeout, "timed out waiting for tokens");
        return Err(Error::TimedOut(timeout));
    }
    Ok(wait_secs.min((deadline - now).as_secs_f64()))
}

pub(crate) fn validate_timeout(timeout_secs: f64) -> Result<Duration, Error> {
    if !timeout_secs.is_finite() || timeout_secs < 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "timeout should be a non-negative number of seconds, got {timeout_secs}"
        )));
    }
    Ok(saturating_duration(timeout_secs))
}

/// The instant a timeout expires, or `None` when it lies beyond what a
/// [`Duration`] can represent, which is as good as never.
pub(crate) fn deadline(now: Duration, timeout: Option<Duration>) -> Option<Duration> {
    timeout.and_then(|timeout| now.checked_add(timeout))
}

/// Consumes from a [`TokenBucket`], blocking the calling thread until the
/// tokens are available or an optional timeout passes.
///
/// # Examples
///
/// ```rust
/// use clepsydra::{AtomicStorage, BlockingConsumer, Rate, TokenBucket};
/// use std::num::NonZeroU32;
/// use std::time::Duration;
///
/// let rate = Rate::per_second(NonZeroU32::new(1000).unwrap());
/// let bucket = TokenBucket::new(10, rate, AtomicStorage::default()).unwrap();
/// bucket.bootstrap(0).unwrap();
///
/// let consumer = BlockingConsumer::with_timeout(bucket, Duration::from_secs(1));
/// // waits for roughly five milliseconds
/// consumer.consume(5).unwrap();
/// ```
#[derive(Debug)]
pub struct BlockingConsumer<S, C = SystemClock, Z = ThreadSleeper> {
    bucket: TokenBucket<S, C>,
    timeout: Option<Duration>,
    sleeper: Z,
}

impl<S: Storage, C: Clock> BlockingConsumer<S, C, ThreadSleeper> {
    /// A consumer waiting as long as it takes.
    pub fn new(bucket: TokenBucket<S, C>) -> Self {
        Self {
            bucket,
            timeout: None,
            sleeper: ThreadSleeper,
        }
    }

    /// A consumer giving up after `timeout`.
    pub fn with_timeout(bucket: TokenBucket<S, C>, timeout: Duration) -> Self {
        Self {
            bucket,
            timeout: Some(timeout),
            sleeper: ThreadSleeper,
        }
    }

    /// A consumer giving up after `timeout_secs` seconds.
    ///
    /// Fails with [`Error::InvalidConfiguration`] for negative or non-finite
    /// timeouts.
    pub fn with_timeout_secs(bucket: TokenBucket<S, C>, timeout_secs: f64) -> Result<Self, Error> {
        Ok(Self::with_timeout(bucket, validate_timeout(timeout_secs)?))
    }
}

impl<S: Storage, C: Clock, Z: Sleeper> BlockingConsumer<S, C, Z> {
    /// Replaces the way this consumer waits between attempts.
    pub fn with_sleeper<Z2: Sleeper>(self, sleeper: Z2) -> BlockingConsumer<S, C, Z2> {
        BlockingConsumer {
            bucket: self.bucket,
            timeout: self.timeout,
            sleeper,
        }
    }

    /// Takes `tokens` out of the bucket, waiting for them if needed.
    ///
    /// Fails with [`Error::TimedOut`] once the timeout passed without the
    /// tokens becoming available; the timeout is checked between naps, so a
    /// nap in progress always completes. Argument and storage errors of
    /// [`TokenBucket::consume`] are returned right away.
    pub fn consume(&self, tokens: u64) -> Result<(), Error> {
        let deadline = deadline(self.bucket.clock().now(), self.timeout);
        loop {
            let consumption = self.bucket.consume(tokens)?;
            if consumption.is_granted() {
                return Ok(());
            }
            let now = self.bucket.clock().now();
            let wait_secs = next_wait(consumption, now, deadline, self.timeout)?;
            let (coarse, fine) = naps(wait_secs);
            debug!(tokens, wait_secs, "waiting for tokens");
            if let Some(coarse) = coarse {
                self.sleeper.sleep(coarse);
            }
            self.sleeper.sleep(fine);
        }
    }

    pub fn bucket(&self) -> &TokenBucket<S, C> {
        &self.bucket
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
