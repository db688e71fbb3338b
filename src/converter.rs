use std::time::Duration;

use crate::Rate;

/// Seconds elapsed between `timestamp` (fractional seconds since the epoch)
/// and `now`.
///
/// Both operands are split into whole seconds and a fraction before they are
/// subtracted. Folding `now` into a single `f64` first would round it to
/// roughly a quarter of a microsecond for present-day timestamps and the
/// difference of two such values loses exactly the sub-microsecond part that
/// fast rates depend on.
pub fn seconds_since(now: Duration, timestamp: f64) -> f64 {
    let whole = timestamp.floor();
    let fraction = timestamp - whole;
    let seconds = now.as_secs() as f64 - whole;
    seconds + (f64::from(now.subsec_nanos()) / 1e9 - fraction)
}

/// Converts between token amounts, durations and points in time for a given
/// [`Rate`].
///
/// Seconds are truncated toward zero when they are turned into tokens, while
/// tokens turn into fractional seconds unchanged. A bucket therefore never
/// reports a token that has not fully accumulated yet.
#[derive(Debug, Clone, Copy)]
pub struct TokenConverter {
    tokens_per_second: f64,
}

impl TokenConverter {
    pub fn new(rate: &Rate) -> Self {
        Self {
            tokens_per_second: rate.tokens_per_second(),
        }
    }

    /// Whole tokens produced within `seconds`.
    pub fn seconds_to_tokens(&self, seconds: f64) -> i64 {
        (seconds * self.tokens_per_second) as i64
    }

    /// Seconds needed to produce `tokens`.
    pub fn tokens_to_seconds(&self, tokens: u64) -> f64 {
        tokens as f64 / self.tokens_per_second
    }

    /// The timestamp in the past since which exactly `tokens` have been
    /// produced as of `now`.
    pub fn tokens_to_timestamp(&self, tokens: u64, now: Duration) -> f64 {
        let mut timestamp = now.as_secs_f64() - self.tokens_to_seconds(tokens);
        // rounding must never move the timestamp forward, or the bucket
        // would come up short of `tokens`
        let tokens = i64::try_from(tokens).unwrap_or(i64::MAX);
        while self.timestamp_to_tokens(timestamp, now) < tokens {
            timestamp = timestamp.next_down();
        }
        timestamp
    }

    /// Whole tokens produced between `timestamp` and `now`.
    pub fn timestamp_to_tokens(&self, timestamp: f64, now: Duration) -> i64 {
        self.seconds_to_tokens(seconds_since(now, timestamp))
    }
}
