//! # Streams
//!
//! Fan-in and batching over `tokio` channels.
//!
//! ## Overview
//!
//! - **Merge**: Drains many `mpsc` receivers into one [`MergedStream`]
//! - **Batch**: Groups a stream into size- and time-bounded `Vec<T>` batches
//!
//! Both propagate upstream closure to downstream closure and carry no error
//! payloads. They compose in either order:
//!
//! ```rust,ignore
//! use tributary_core::stream::{self, BatchConfig};
//!
//! // merge then batch
//! let (output, canceller) = stream::merge(receivers).into_parts();
//! let batches = stream::batch(output, BatchConfig::with_size(128));
//!
//! // batch then merge
//! let per_source: Vec<_> = receivers
//!     .into_iter()
//!     .map(|rx| stream::batch(ReceiverStream::new(rx), BatchConfig::default()))
//!     .collect();
//! let merged = stream::merge(per_source);
//! ```
//!
//! ## Module Structure
//!
//! - [`config`]: Configuration types for the batcher and merger
//! - [`merge`](mod@merge): Fan-in with joinable cancellation
//! - [`batch`](mod@batch): Size- and time-bounded batching
//!
//! ## Cancellation
//!
//! | Component | Signal | Effect |
//! |-----------|--------|--------|
//! | Merge | [`MergeCanceller::cancel`] | Forwarders stop, output closes, call joins them |
//! | Batch | Input closure | Final partial batch flushed, output closes |

pub mod batch;
pub mod config;
pub mod merge;

pub use batch::{batch, batch_with_clock};
pub use config::{
    BatchConfig, BatchConfigBuilder, MergeConfig, MergeConfigBuilder, DEFAULT_BATCH_SIZE,
    DEFAULT_FAN_IN_WIDTH, DEFAULT_MERGE_BUFFER,
};
pub use merge::{merge, merge_with_config, MergeCanceller, Merged, MergedStream};
