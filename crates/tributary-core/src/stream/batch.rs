//! Size- and time-bounded batching.
//!
//! Accumulates consecutive items from one input stream and delivers them as
//! `Vec<T>` batches on an output channel, in arrival order.
//!
//! # Flush Triggers
//!
//! A batch is flushed when either:
//! - The buffer reaches `size` items (size trigger)
//! - The wait-limit ticker fires while the buffer is non-empty (time trigger)
//! - The input closes while the buffer is non-empty (final flush)
//!
//! The ticker is re-armed at the top of every loop iteration, including
//! iterations that only received an item. Under steady input slower than
//! the wait limit a partial batch therefore waits for a full gap of
//! silence, not for the wait limit since its first item.
//!
//! Empty batches are never emitted. The batcher exits as soon as the
//! consumer drops the output, even while the input is idle.
//!
//! # Backpressure
//!
//! The output channel holds a single batch. While the consumer is behind,
//! the batcher suspends on the send and stops draining its input.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::clock::{Clock, Ticker, TokioClock};
use crate::stream::config::BatchConfig;

/// Batches `input` using the tokio clock.
///
/// Returns the receiving end of the batch channel. The channel closes after
/// the input has closed and the final partial batch has been delivered.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
#[must_use]
pub fn batch<S, T>(input: S, config: BatchConfig) -> mpsc::Receiver<Vec<T>>
where
    S: Stream<Item = T> + Send + Unpin + 'static,
    T: Send + 'static,
{
    batch_with_clock(input, config, Arc::new(TokioClock))
}

/// Batches `input`, taking wait-limit tickers from `clock`.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
#[must_use]
pub fn batch_with_clock<S, T>(
    input: S,
    config: BatchConfig,
    clock: Arc<dyn Clock>,
) -> mpsc::Receiver<Vec<T>>
where
    S: Stream<Item = T> + Send + Unpin + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let batcher = Batcher::new(input, tx, &config, clock.as_ref());
    tokio::spawn(batcher.run());
    rx
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

struct Batcher<S, T> {
    input: S,
    output: mpsc::Sender<Vec<T>>,
    size: usize,
    ticker: Option<Box<dyn Ticker>>,
    buffer: Vec<T>,
}

impl<S, T> Batcher<S, T>
where
    S: Stream<Item = T> + Send + Unpin,
    T: Send,
{
    fn new(
        input: S,
        output: mpsc::Sender<Vec<T>>,
        config: &BatchConfig,
        clock: &dyn Clock,
    ) -> Self {
        let size = config.effective_size();
        Self {
            input,
            output,
            size,
            ticker: config.effective_wait_limit().map(|limit| clock.ticker(limit)),
            buffer: Vec::with_capacity(size),
        }
    }

    async fn run(mut self) {
        loop {
            if let Some(ticker) = self.ticker.as_mut() {
                ticker.reset();
            }

            tokio::select! {
                item = self.input.next() => match item {
                    Some(item) => {
                        self.buffer.push(item);
                        if self.buffer.len() >= self.size && !self.flush().await {
                            break;
                        }
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                () = next_tick(&mut self.ticker) => {
                    if !self.flush().await {
                        break;
                    }
                }
                () = self.output.closed() => {
                    tracing::debug!("batch consumer dropped, stopping batcher");
                    break;
                }
            }
        }

        if let Some(ticker) = self.ticker.as_mut() {
            ticker.stop();
        }
    }

    /// Sends the buffered items as one batch.
    ///
    /// Returns false if the consumer has gone away.
    async fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
        tracing::trace!(len = batch.len(), "flushing batch");
        if self.output.send(batch).await.is_err() {
            tracing::debug!("batch consumer dropped, stopping batcher");
            return false;
        }
        true
    }
}

async fn next_tick(ticker: &mut Option<Box<dyn Ticker>>) {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
