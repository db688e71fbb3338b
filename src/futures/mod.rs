//! Async counterpart of [`BlockingConsumer`](crate::BlockingConsumer),
//! waiting on tokio's timer instead of blocking the thread.

mod consumer;
mod timer;

pub use consumer::AsyncConsumer;
