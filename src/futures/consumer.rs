use std::time::Duration;

use tracing::debug;

use super::timer::sleep;
use crate::consumer::{deadline, naps, next_wait, validate_timeout};
use crate::{Clock, Error, Storage, SystemClock, TokenBucket};

/// Consumes from a [`TokenBucket`], yielding to the runtime while it waits
/// for tokens.
///
/// Waiting follows the same schedule as the blocking consumer. Pair it with
/// [`TokioClock`](crate::TokioClock) when the runtime's time is paused in
/// tests.
///
/// # Examples
///
/// ```rust
/// use clepsydra::futures::AsyncConsumer;
/// use clepsydra::{AtomicStorage, Rate, TokenBucket};
/// use std::num::NonZeroU32;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let rate = Rate::per_second(NonZeroU32::new(1000).unwrap());
/// let bucket = TokenBucket::new(10, rate, AtomicStorage::default()).unwrap();
/// bucket.bootstrap(0).unwrap();
///
/// let consumer = AsyncConsumer::new(bucket);
/// consumer.consume(5).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncConsumer<S, C = SystemClock> {
    bucket: TokenBucket<S, C>,
    timeout: Option<Duration>,
}

impl<S: Storage, C: Clock> AsyncConsumer<S, C> {
    pub fn new(bucket: TokenBucket<S, C>) -> Self {
        Self {
            bucket,
            timeout: None,
        }
    }

    pub fn with_timeout(bucket: TokenBucket<S, C>, timeout: Duration) -> Self {
        Self {
            bucket,
            timeout: Some(timeout),
        }
    }

    /// Fails with [`Error::InvalidConfiguration`] for negative or non-finite
    /// timeouts.
    pub fn with_timeout_secs(bucket: TokenBucket<S, C>, timeout_secs: f64) -> Result<Self, Error> {
        Ok(Self::with_timeout(bucket, validate_timeout(timeout_secs)?))
    }

    /// Takes `tokens` out of the bucket, waiting for them if needed.
    ///
    /// Fails with [`Error::TimedOut`] once the timeout passed. Dropping the
    /// future while it waits leaves the bucket untouched.
    pub async fn consume(&self, tokens: u64) -> Result<(), Error> {
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
                sleep(coarse).await;
            }
            sleep(fine).await;
        }
    }

    pub fn bucket(&self) -> &TokenBucket<S, C> {
        &self.bucket
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
