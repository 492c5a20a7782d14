//! Fan-in of many channels into one.
//!
//! [`merge`] drains any number of `mpsc` receivers into a single output.
//! Items keep their per-input order; across inputs the order is whatever
//! the scheduler produces.
//!
//! # Shape
//!
//! A forwarder task waits on at most `fan_in_width` inputs. Wider fan-ins
//! are split into buckets, each bucket gets its own forwarder, and the
//! bucket outputs are merged again until one forwarder is left:
//!
//! ```text
//! in[0..10]  ──► forwarder ──┐
//! in[10..20] ──► forwarder ──┼──► forwarder ──► MergedStream
//! in[20..23] ──► forwarder ──┘
//! ```
//!
//! All forwarders in the tree observe one cancellation token.
//! [`MergeCanceller::cancel`] raises it and then joins every forwarder, so
//! once it returns nothing is left running and the output yields no further
//! items.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::stream::config::MergeConfig;

/// Merges `inputs` into one stream using the default [`MergeConfig`].
///
/// - No inputs: the output is already closed.
/// - One input: the input is returned as the output; no task is spawned.
/// - Otherwise forwarder tasks are spawned on the current tokio runtime.
///
/// In the first two cases the canceller is a no-op.
///
/// # Panics
///
/// Panics if called with two or more inputs outside a tokio runtime.
#[must_use]
pub fn merge<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> Merged<T> {
    merge_with_config(inputs, &MergeConfig::default())
}

/// Merges `inputs` into one stream with a custom configuration.
///
/// # Panics
///
/// Panics if called with two or more inputs outside a tokio runtime.
#[must_use]
pub fn merge_with_config<T: Send + 'static>(
    mut inputs: Vec<mpsc::Receiver<T>>,
    config: &MergeConfig,
) -> Merged<T> {
    match inputs.len() {
        0 | 1 => {
            // No inputs: hand out a receiver whose sender is already gone.
            let rx = inputs.pop().unwrap_or_else(|| mpsc::channel(1).1);
            Merged::passthrough(rx)
        }
        _ => {
            let width = config.fan_in_width.max(2);
            let buffer = config.buffer_size.max(1);
            let token = CancellationToken::new();
            let mut handles = Vec::new();
            let output = build_tree(inputs, width, buffer, &token, &mut handles);

            tracing::debug!(forwarders = handles.len(), "merge started");

            let forwarders = handles.len();
            let state = Arc::new(CancelState {
                token: token.clone(),
                handles: Mutex::new(handles),
                forwarders,
            });
            Merged {
                output: MergedStream {
                    inner: output,
                    token: Some(token),
                },
                cancel: MergeCanceller { state: Some(state) },
            }
        }
    }
}

/// Reduces `inputs` to a single receiver, spawning one forwarder per bucket.
fn build_tree<T: Send + 'static>(
    inputs: Vec<mpsc::Receiver<T>>,
    width: usize,
    buffer: usize,
    token: &CancellationToken,
    handles: &mut Vec<JoinHandle<()>>,
) -> mpsc::Receiver<T> {
    if inputs.len() <= width {
        return spawn_forwarder(inputs, buffer, token, handles);
    }

    let mut outputs = Vec::with_capacity(inputs.len().div_ceil(width));
    let mut remaining = inputs.into_iter().peekable();
    while remaining.peek().is_some() {
        let bucket: Vec<_> = remaining.by_ref().take(width).collect();
        // A trailing bucket of one needs no forwarder of its own.
        let output = match <[mpsc::Receiver<T>; 1]>::try_from(bucket) {
            Ok([single]) => single,
            Err(bucket) => spawn_forwarder(bucket, buffer, token, handles),
        };
        outputs.push(output);
    }

    build_tree(outputs, width, buffer, token, handles)
}

fn spawn_forwarder<T: Send + 'static>(
    inputs: Vec<mpsc::Receiver<T>>,
    buffer: usize,
    token: &CancellationToken,
    handles: &mut Vec<JoinHandle<()>>,
) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(buffer);
    let width = inputs.len();
    handles.push(tokio::spawn(forward(inputs, tx, token.clone())));
    tracing::trace!(width, "spawned merge forwarder");
    rx
}

/// Forwards every item from `inputs` to `output` until all inputs close,
/// the output receiver is dropped, or `token` is cancelled.
async fn forward<T>(
    inputs: Vec<mpsc::Receiver<T>>,
    output: mpsc::Sender<T>,
    token: CancellationToken,
) {
    let mut merged = stream::select_all(inputs.into_iter().map(ReceiverStream::new));

    loop {
        let item = tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = output.closed() => {
                tracing::debug!("merge output dropped, stopping forwarder");
                break;
            }
            item = merged.next() => item,
        };
        let Some(item) = item else {
            break;
        };

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            sent = output.send(item) => {
                if sent.is_err() {
                    tracing::debug!("merge output dropped, stopping forwarder");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Merged
// ---------------------------------------------------------------------------

/// Result of a merge: the combined output and its cancel handle.
#[derive(Debug)]
pub struct Merged<T> {
    /// The combined stream.
    pub output: MergedStream<T>,
    /// Stops the forwarders feeding `output`.
    pub cancel: MergeCanceller,
}

impl<T> Merged<T> {
    fn passthrough(rx: mpsc::Receiver<T>) -> Self {
        Self {
            output: MergedStream {
                inner: rx,
                token: None,
            },
            cancel: MergeCanceller { state: None },
        }
    }

    /// Splits into the output stream and the canceller.
    #[must_use]
    pub fn into_parts(self) -> (MergedStream<T>, MergeCanceller) {
        (self.output, self.cancel)
    }
}

// ---------------------------------------------------------------------------
// MergedStream
// ---------------------------------------------------------------------------

/// Output side of a merge.
///
/// Yields `None` once every input has closed, or as soon as the merge has
/// been cancelled. Items still in flight at cancellation are discarded.
#[derive(Debug)]
pub struct MergedStream<T> {
    inner: mpsc::Receiver<T>,
    /// `None` for pass-through merges, which cannot be cancelled.
    token: Option<CancellationToken>,
}

impl<T> MergedStream<T> {
    /// Receives the next item.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        self.next().await
    }

    /// Returns true if the merge feeding this stream has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

impl<T> Stream for MergedStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.is_cancelled() {
            this.inner.close();
            return Poll::Ready(None);
        }
        // Cancellation drops every sender, which wakes a pending receiver.
        this.inner.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// MergeCanceller
// ---------------------------------------------------------------------------

struct CancelState {
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    forwarders: usize,
}

/// Cancel handle of a merge.
///
/// Cheap to clone; all clones cancel the same merge.
#[derive(Clone, Default)]
pub struct MergeCanceller {
    /// `None` for pass-through merges.
    state: Option<Arc<CancelState>>,
}

impl MergeCanceller {
    /// Stops every forwarder and waits for them to exit.
    ///
    /// Idempotent. Concurrent callers all return only after the forwarders
    /// have been joined. Once this returns the output stream is closed and
    /// yields no further items.
    pub async fn cancel(&self) {
        let Some(state) = &self.state else {
            return;
        };

        if !state.token.is_cancelled() {
            tracing::debug!(forwarders = state.forwarders, "cancelling merge");
        }
        state.token.cancel();

        let mut handles = state.handles.lock().await;
        while let Some(handle) = handles.last_mut() {
            if let Err(e) = handle.await {
                tracing::warn!("merge forwarder ended abnormally: {e}");
            }
            handles.pop();
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.token.is_cancelled())
    }

    /// Returns the number of forwarder tasks the merge spawned.
    #[must_use]
    pub fn forwarder_count(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.forwarders)
    }
}

impl std::fmt::Debug for MergeCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeCanceller")
            .field("forwarders", &self.forwarder_count())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
