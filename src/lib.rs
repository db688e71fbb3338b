#![doc = include_str!("../README.md")]
//!
//! # Core Components
//!
//! - [`TokenBucket`] - The token bucket, generic over its [`Storage`] and [`Clock`]
//! - [`Rate`] - Tokens produced per [`Unit`] of time
//! - [`BlockingConsumer`] - Waits for tokens, with an optional timeout
//! - [`Storage`] implementations for process, session and host wide buckets
//! - [`Mutex`] implementations guarding the read-modify-write of a bucket
//!
//! # Quick Start
//!
//! ```rust
//! use clepsydra::{Consumption, LocalStorage, Rate, TokenBucket, Unit};
//!
//! // 10 tokens per second, at most 20 at once
//! let rate = Rate::new(10.0, Unit::Second).unwrap();
//! let bucket = TokenBucket::new(20, rate, LocalStorage::default()).unwrap();
//! bucket.bootstrap(20).unwrap();
//!
//! match bucket.consume(5).unwrap() {
//!     Consumption::Granted => println!("go ahead"),
//!     Consumption::Limited(limited) => {
//!         println!("retry in {:?}", limited.earliest_retry_after())
//!     }
//! }
//! ```

mod bucket;
mod clock;
mod consumer;
mod converter;
mod error;
#[cfg(feature = "async")]
pub mod futures;
mod mutex;
mod rate;
mod storage;

pub use bucket::{Consumption, TokenBucket};
#[cfg(feature = "quanta")]
pub use clock::QuantaClock;
#[cfg(feature = "tokio")]
pub use clock::TokioClock;
pub use clock::{Clock, ManualClock, SystemClock};
pub use consumer::{BlockingConsumer, Sleeper, ThreadSleeper};
pub use converter::{TokenConverter, seconds_since};
pub use error::*;
pub use mutex::{Check, FileMutex, FileMutexGuard, Mutex, NoMutex, ThreadMutex};
pub use rate::{Rate, Unit};

pub use storage::{
    MICROTIME_LEN, Scope, Storage, atomic::AtomicStorage, file::FileStorage,
    local::LocalStorage, pack_microtime, session::SESSION_NAMESPACE, session::Session,
    session::SessionStorage, unpack_microtime,
};
