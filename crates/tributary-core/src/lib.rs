//! # Tributary Core
//!
//! Concurrency building blocks for `tokio` services.
//!
//! This crate provides:
//! - **Lock**: A factory of per-key reader/writer locks that keeps no state
//!   for keys nobody holds
//! - **Merge**: Fan-in of many channels into one, with a joinable cancel
//! - **Batch**: Size- and time-bounded batching of a stream
//! - **Clock**: The ticker seam the batcher uses for its time bound
//!
//! ## Example
//!
//! ```rust,ignore
//! use tributary_core::stream::{self, BatchConfig};
//! use tokio_stream::StreamExt;
//!
//! let merged = stream::merge(vec![rx_a, rx_b, rx_c]);
//! let (output, canceller) = merged.into_parts();
//!
//! let mut batches = stream::batch(output, BatchConfig::builder().size(32).build());
//! while let Some(batch) = batches.recv().await {
//!     process(batch);
//! }
//!
//! canceller.cancel().await;
//! ```
//!
//! ## Design Principles
//!
//! 1. **Backpressure over buffering** - Sends suspend until the consumer has room
//! 2. **Closure is the terminal signal** - Upstream closure always flushes and closes downstream
//! 3. **No garbage under churn** - Lock records live exactly as long as someone uses them

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod error;
pub mod lock;
pub mod stream;

// Re-export key types
pub use clock::{Clock, Ticker, TokioClock};
pub use error::{ConfigError, LockError};
pub use lock::{KeyLocker, LockFactory, LockFactoryConfig, Locker};
pub use stream::{batch, merge, BatchConfig, MergeCanceller, MergeConfig, Merged, MergedStream};
